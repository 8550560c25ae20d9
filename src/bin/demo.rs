//! Demo launcher for the deeplink crate
//!
//! Registers the `myapp` scheme, then either becomes the primary instance
//! (printing every received link) or forwards its argument to the running
//! primary and exits. Try `deeplink-demo 'myapp://open?id=42'` from a
//! second terminal while the first instance is running, and
//! `deeplink-demo --unregister` to remove the handler again.

use anyhow::Result;
use deeplink::DeepLink;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SCHEME: &str = "myapp";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--unregister") {
        deeplink::registry::unregister_scheme(SCHEME)?;
        println!("unregistered {SCHEME}://");
        return Ok(());
    }

    deeplink::registry::register_scheme(SCHEME, &env::current_exe()?)?;

    let mut link = DeepLink::new(SCHEME)?;
    link.set_on_message(|url| println!("received deep link: {url}"));

    if !link.run_or_forward(&args)? {
        // A primary is already running and now owns our link.
        return Ok(());
    }

    println!("primary instance running; press Ctrl-C to exit");

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, term.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term.clone())?;

    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    Ok(())
}

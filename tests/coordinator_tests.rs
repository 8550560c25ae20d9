// Integration tests for primary/secondary startup coordination

use deeplink::DeepLink;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn coordinator(dir: &tempfile::TempDir, scheme: &str) -> DeepLink {
    DeepLink::with_channel_dir(scheme, dir.path().to_path_buf()).expect("valid scheme")
}

fn collecting(link: &mut DeepLink) -> Arc<Mutex<Vec<String>>> {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    link.set_on_message(move |url| sink.lock().unwrap().push(url.to_string()));
    messages
}

fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_first_launch_with_link_self_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let mut link = coordinator(&dir, "myapp");
    let messages = collecting(&mut link);

    let primary = link
        .run_or_forward(&["myapp://open?id=42".to_string()])
        .unwrap();

    assert!(primary);
    assert!(link.is_primary());
    // Self-delivery is synchronous on the calling thread, so the link is
    // already there when run_or_forward returns.
    assert_eq!(*messages.lock().unwrap(), vec!["myapp://open?id=42"]);
}

#[test]
fn test_first_launch_with_empty_args_listens_quietly() {
    let dir = tempfile::tempdir().unwrap();
    let mut link = coordinator(&dir, "myapp");
    let messages = collecting(&mut link);

    assert!(link.run_or_forward(&[]).unwrap());
    assert!(link.is_primary());
    assert!(messages.lock().unwrap().is_empty());
    // The listener is up and ready for future connections.
    assert!(link.channel().probe());
}

#[test]
fn test_foreign_argument_is_not_self_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let mut link = coordinator(&dir, "myapp");
    let messages = collecting(&mut link);

    let primary = link
        .run_or_forward(&["otherapp://open".to_string()])
        .unwrap();

    assert!(primary);
    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn test_second_launch_forwards_to_the_primary() {
    let dir = tempfile::tempdir().unwrap();

    let mut primary = coordinator(&dir, "myapp");
    let messages = collecting(&mut primary);
    assert!(primary.run_or_forward(&[]).unwrap());

    let mut secondary = coordinator(&dir, "myapp");
    secondary.set_on_message(|url| panic!("secondary must never receive links, got {url}"));
    let became_primary = secondary
        .run_or_forward(&["myapp://open?id=7".to_string()])
        .unwrap();

    assert!(!became_primary);
    assert!(!secondary.is_primary());

    assert!(wait_for(|| messages.lock().unwrap().len() == 1));
    assert_eq!(messages.lock().unwrap()[0], "myapp://open?id=7");
}

#[test]
fn test_second_launch_with_empty_args_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let mut primary = coordinator(&dir, "myapp");
    let messages = collecting(&mut primary);
    assert!(primary.run_or_forward(&[]).unwrap());

    let mut secondary = coordinator(&dir, "myapp");
    assert!(!secondary.run_or_forward(&[]).unwrap());

    std::thread::sleep(Duration::from_millis(200));
    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn test_run_or_forward_twice_stays_primary() {
    let dir = tempfile::tempdir().unwrap();
    let mut link = coordinator(&dir, "myapp");
    let messages = collecting(&mut link);

    assert!(link.run_or_forward(&[]).unwrap());
    assert!(link.run_or_forward(&["myapp://again".to_string()]).unwrap());

    // The second call is a no-op: no second listener, no self-delivery.
    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn test_shutdown_releases_the_claim() {
    let dir = tempfile::tempdir().unwrap();

    let mut link = coordinator(&dir, "myapp");
    assert!(link.run_or_forward(&[]).unwrap());

    link.shutdown();
    assert!(!link.is_primary());
    assert!(!link.channel().probe());

    // The same coordinator can claim the scheme again.
    assert!(link.run_or_forward(&[]).unwrap());
    assert!(link.channel().probe());
}

#[test]
fn test_drop_releases_the_claim() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut first = coordinator(&dir, "myapp");
        assert!(first.run_or_forward(&[]).unwrap());
    }

    let mut second = coordinator(&dir, "myapp");
    assert!(second.run_or_forward(&[]).unwrap());
}

#[test]
fn test_concurrent_launches_settle_exactly_one_primary() {
    let dir = Arc::new(tempfile::tempdir().unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let dir = dir.clone();
        handles.push(std::thread::spawn(move || {
            let mut link =
                DeepLink::with_channel_dir("racer", dir.path().to_path_buf()).unwrap();
            let primary = link.run_or_forward(&[]).unwrap();
            // Keep the coordinator alive until every launch has settled.
            (primary, link)
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let primaries = results.iter().filter(|(primary, _)| *primary).count();
    assert_eq!(primaries, 1, "exactly one launch may win the claim");
}

#[test]
fn test_forward_payload_round_trips_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();

    let mut primary = coordinator(&dir, "myapp");
    let messages = collecting(&mut primary);
    assert!(primary.run_or_forward(&[]).unwrap());

    let url = "myapp://open?id=42&name=a%20b#frag";
    let mut secondary = coordinator(&dir, "myapp");
    assert!(!secondary.run_or_forward(&[url.to_string()]).unwrap());

    assert!(wait_for(|| !messages.lock().unwrap().is_empty()));
    assert_eq!(messages.lock().unwrap()[0], url);
}

#[test]
fn test_only_the_last_argument_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();

    let mut primary = coordinator(&dir, "myapp");
    let messages = collecting(&mut primary);
    assert!(primary.run_or_forward(&[]).unwrap());

    let mut secondary = coordinator(&dir, "myapp");
    let args = vec!["--flag".to_string(), "myapp://open?id=9".to_string()];
    assert!(!secondary.run_or_forward(&args).unwrap());

    assert!(wait_for(|| !messages.lock().unwrap().is_empty()));
    assert_eq!(*messages.lock().unwrap(), vec!["myapp://open?id=9"]);
}

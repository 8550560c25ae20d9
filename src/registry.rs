//! URL-scheme registration collaborator
//!
//! Associates a scheme with an executable through the XDG conventions: a
//! desktop entry under the user's applications directory plus a
//! `[Default Applications]` line in `mimeapps.list`. Registration is an
//! idempotent overwrite; unregistering a scheme that was never registered
//! is not an error.

use crate::error::RegistrationError;
use crate::ipc::channel::scheme_is_valid;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULTS_SECTION: &str = "[Default Applications]";

fn entry_name(scheme: &str) -> String {
    format!("{scheme}-handler.desktop")
}

fn applications_dir() -> Result<PathBuf, RegistrationError> {
    dirs::data_dir()
        .map(|dir| dir.join("applications"))
        .ok_or(RegistrationError::NoApplicationsDir)
}

fn mimeapps_path() -> Result<PathBuf, RegistrationError> {
    dirs::config_dir()
        .map(|dir| dir.join("mimeapps.list"))
        .ok_or(RegistrationError::NoApplicationsDir)
}

/// Render the desktop entry for a scheme handler. The `%u` placeholder
/// makes the launcher pass the clicked URL as the last argument.
fn render_entry(scheme: &str, exec_path: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name={scheme} URL handler\n\
         Exec=\"{exec}\" %u\n\
         MimeType=x-scheme-handler/{scheme};\n\
         NoDisplay=true\n\
         Terminal=false\n",
        exec = exec_path.display(),
    )
}

/// Insert or replace `mime=entry` under `[Default Applications]`,
/// preserving every other line and section.
fn upsert_default_handler(existing: &str, mime: &str, entry: &str) -> String {
    let assignment = format!("{mime}={entry}");
    let mut out: Vec<String> = Vec::new();
    let mut in_defaults = false;
    let mut inserted = false;

    for line in existing.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            // Leaving the defaults section without a hit: append the
            // assignment at its end.
            if in_defaults && !inserted {
                out.push(assignment.clone());
                inserted = true;
            }
            in_defaults = trimmed == DEFAULTS_SECTION;
            out.push(line.to_string());
            continue;
        }

        if in_defaults {
            if let Some((key, _)) = line.split_once('=') {
                if key.trim() == mime {
                    if !inserted {
                        out.push(assignment.clone());
                        inserted = true;
                    }
                    // Replaced, and duplicates collapse.
                    continue;
                }
            }
        }

        out.push(line.to_string());
    }

    if !inserted {
        if !out.iter().any(|line| line.trim() == DEFAULTS_SECTION) {
            out.push(DEFAULTS_SECTION.to_string());
        }
        out.push(assignment);
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}

/// Drop the `mime=` line from `[Default Applications]`, leaving everything
/// else untouched.
fn remove_default_handler(existing: &str, mime: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_defaults = false;

    for line in existing.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            in_defaults = trimmed == DEFAULTS_SECTION;
            out.push(line);
            continue;
        }

        if in_defaults {
            if let Some((key, _)) = line.split_once('=') {
                if key.trim() == mime {
                    continue;
                }
            }
        }

        out.push(line);
    }

    let mut rendered = out.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}

/// Register `exec_path` as the handler for `scheme://` links.
///
/// Overwrites any previous registration for the same scheme.
pub fn register_scheme(scheme: &str, exec_path: &Path) -> Result<(), RegistrationError> {
    if !scheme_is_valid(scheme) {
        return Err(RegistrationError::InvalidScheme(scheme.to_string()));
    }

    let apps_dir = applications_dir()?;
    let entry_path = apps_dir.join(entry_name(scheme));

    fs::create_dir_all(&apps_dir).map_err(|source| RegistrationError::WriteEntry {
        path: entry_path.clone(),
        source,
    })?;
    fs::write(&entry_path, render_entry(scheme, exec_path)).map_err(|source| {
        RegistrationError::WriteEntry {
            path: entry_path.clone(),
            source,
        }
    })?;

    set_default_handler(scheme, &entry_name(scheme))?;
    debug!("registered {scheme}:// -> {}", exec_path.display());

    Ok(())
}

/// Remove the handler registration for `scheme`.
pub fn unregister_scheme(scheme: &str) -> Result<(), RegistrationError> {
    if !scheme_is_valid(scheme) {
        return Err(RegistrationError::InvalidScheme(scheme.to_string()));
    }

    let entry_path = applications_dir()?.join(entry_name(scheme));
    match fs::remove_file(&entry_path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(RegistrationError::RemoveEntry {
                path: entry_path,
                source,
            })
        }
    }

    let path = mimeapps_path()?;
    let existing = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(RegistrationError::Associate { path, source }),
    };

    let mime = format!("x-scheme-handler/{scheme}");
    let updated = remove_default_handler(&existing, &mime);
    fs::write(&path, updated).map_err(|source| RegistrationError::Associate {
        path: path.clone(),
        source,
    })?;

    debug!("unregistered {scheme}://");
    Ok(())
}

fn set_default_handler(scheme: &str, entry: &str) -> Result<(), RegistrationError> {
    let path = mimeapps_path()?;

    let existing = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(RegistrationError::Associate { path, source }),
    };

    let mime = format!("x-scheme-handler/{scheme}");
    let updated = upsert_default_handler(&existing, &mime, entry);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RegistrationError::Associate {
            path: path.clone(),
            source,
        })?;
    }
    fs::write(&path, updated).map_err(|source| RegistrationError::Associate {
        path: path.clone(),
        source,
    })
}

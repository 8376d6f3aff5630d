//! Writes target groups in the format of Prometheus's `file_sd_configs`.
//!
//! ```json
//! [
//!   {
//!     "targets": ["mongodb-prom-proxy.api.stackit.cloud"],
//!     "labels": {
//!       "__metrics_path__": "/v2/projects/p1/regions/eu01/instances/abc/metrics",
//!       "instance": "abc"
//!     }
//!   }
//! ]
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use framework::Context;
use framework::observe::{ADDRESS_LABEL, Change, Notifier, TargetGroup};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("encode targets failed, {0}")]
    Encode(#[from] serde_json::Error),
    #[error("write {path:?} failed, {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    targets: [&'a str; 1],
    labels: BTreeMap<&'a str, &'a str>,
}

/// Renders one entry per target, the address becomes the only element of
/// `targets` and all other labels, including the common labels of the
/// group, go to `labels`. Targets without address are skipped.
pub fn render(groups: &[TargetGroup]) -> Result<Vec<u8>, serde_json::Error> {
    let mut entries = Vec::new();

    for group in groups {
        for target in &group.targets {
            let Some(address) = target.get(ADDRESS_LABEL) else {
                continue;
            };

            let labels = group
                .labels
                .iter()
                .chain(target.iter())
                .filter(|(key, _)| *key != ADDRESS_LABEL)
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();

            entries.push(Entry {
                targets: [address.as_str()],
                labels,
            });
        }
    }

    let mut buf = serde_json::to_vec_pretty(&entries)?;
    buf.push(b'\n');

    Ok(buf)
}

/// Writes the rendered targets to `path`, or stdout if `path` is `None`.
///
/// The file is written to a temporary file next to it first and renamed
/// after, so readers never see a partial file.
pub fn write(path: Option<&Path>, groups: &[TargetGroup]) -> Result<(), WriteError> {
    let buf = render(groups)?;

    let Some(path) = path else {
        let mut stdout = std::io::stdout().lock();
        return stdout
            .write_all(&buf)
            .and_then(|_| stdout.flush())
            .map_err(|err| WriteError::Io {
                path: PathBuf::from("stdout"),
                err,
            });
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &buf)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|err| WriteError::Io {
            path: path.to_path_buf(),
            err,
        })
}

/// Writes the latest snapshot every time `notifier` reports changes, until
/// `cx` is done. The first snapshot is always written, whatever the file
/// held before startup is replaced by it.
pub async fn run(mut notifier: Notifier, path: Option<PathBuf>, cx: Context) {
    // Prometheus complains about missing files, an empty list is fine
    if let Some(path) = &path {
        if !path.exists() {
            if let Err(err) = write(Some(path.as_path()), &[]) {
                warn!(message = "create output file failed", %err);
            }
        }
    }

    let mut written = false;
    loop {
        let changes = tokio::select! {
            biased;

            _ = cx.done() => break,
            changes = notifier.next_snapshot() => match changes {
                Some(changes) => changes,
                None => break,
            },
        };

        if written && changes.is_empty() {
            continue;
        }
        changes.iter().for_each(log_change);

        let targets = notifier
            .groups()
            .iter()
            .map(|group| group.targets.len())
            .sum::<usize>();
        match write(path.as_deref(), notifier.groups()) {
            Ok(()) => {
                written = true;
                debug!(message = "targets written", targets);
            }
            Err(err) => warn!(message = "write targets failed", %err),
        }
    }
}

fn log_change(change: &Change) {
    match change {
        Change::Add(targets) => info!(message = "targets added", count = targets.len()),
        Change::Update(targets) => info!(message = "targets updated", count = targets.len()),
        Change::Remove(targets) => info!(message = "targets removed", count = targets.len()),
    }
}

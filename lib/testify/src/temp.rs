use std::path::PathBuf;

use rand::Rng;
use rand::distr::Alphanumeric;

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
}

/// Returns a path in the system temp directory which doesn't exist yet.
pub fn temp_file() -> PathBuf {
    std::env::temp_dir().join(random_string(16))
}

/// Creates an empty directory in the system temp directory, it is not
/// removed afterwards.
pub fn temp_dir() -> PathBuf {
    let path = temp_file();
    std::fs::create_dir_all(&path).expect("create temp directory");
    path
}

//! Random string generation for client credentials, codes and tokens

use rand::Rng;
use rand::distr::Alphanumeric;

/// Generate an alphanumeric string of `length` characters.
///
/// Drawn from the thread-local CSPRNG; codes and tokens rely on this being
/// unpredictable.
pub fn generate_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

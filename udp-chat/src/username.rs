//! Username syntax rule shared by the CLI and `/search`.

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 20;

/// `true` iff `name` has at most [`MAX_USERNAME_LEN`] characters and every
/// character is an ASCII letter or digit.
///
/// The empty string passes; the coordinator decides what to do with it.
pub fn is_valid_username(name: &str) -> bool {
    name.chars().count() <= MAX_USERNAME_LEN && name.chars().all(|c| c.is_ascii_alphanumeric())
}

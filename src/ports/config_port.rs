//! Configuration access port.

/// Lookups over a sectioned key/value source such as an INI file.
///
/// Values that fail to parse fall back to the supplied default; validation
/// happens when [`crate::domain::settings::Settings`] is built.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
}

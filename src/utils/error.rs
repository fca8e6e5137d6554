//! Error handling utilities

use std::any::Any;

/// Extract a readable message from a caught panic payload
///
/// Panics raised with `panic!("...")` carry a `&str` or `String`; anything
/// else is reported generically.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! Classification of recovered panic payloads
//!
//! A panic payload is an arbitrary `Box<dyn Any + Send>`. [`PanicValue`] is the
//! typed view the rest of the interceptor works with; it only borrows the
//! payload, so the original box can still be resumed untouched.

use std::any::Any;
use std::error::Error as StdError;
use std::io;

/// Text used for payloads that are neither errors nor strings
pub(crate) const OPAQUE_PANIC_MESSAGE: &str = "Box<dyn Any>";

/// Client-disconnect conditions, matched against the lowercased system error
const DISCONNECT_CONDITIONS: [&str; 2] = ["broken pipe", "connection reset by peer"];

/// Typed view of a panic payload
#[derive(Debug)]
pub enum PanicValue<'a> {
    /// An I/O error raised by the OS or a socket operation
    Network {
        error: &'a io::Error,
        system_message: String,
    },
    /// Any other error-shaped payload
    Error(&'a (dyn StdError + Send + Sync + 'static)),
    /// `panic!("...")` style payloads
    Message(&'a str),
    /// A payload of a type we cannot inspect
    Opaque,
}

impl<'a> PanicValue<'a> {
    /// Inspect a payload as raised by `panic!`, `panic_any` or `catch_unwind`
    pub fn classify(payload: &'a (dyn Any + Send)) -> Self {
        if let Some(error) = payload.downcast_ref::<io::Error>() {
            return Self::from_io(error);
        }

        if let Some(boxed) = payload.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
            if let Some(error) = boxed.downcast_ref::<io::Error>() {
                return Self::from_io(error);
            }
            return PanicValue::Error(&**boxed);
        }

        if let Some(error) = payload.downcast_ref::<anyhow::Error>() {
            return PanicValue::Error(&**error);
        }

        if let Some(message) = payload.downcast_ref::<&'static str>() {
            return PanicValue::Message(message);
        }

        if let Some(message) = payload.downcast_ref::<String>() {
            return PanicValue::Message(message.as_str());
        }

        PanicValue::Opaque
    }

    fn from_io(error: &'a io::Error) -> Self {
        match system_error_message(error) {
            Some(system_message) => PanicValue::Network { error, system_message },
            None => PanicValue::Error(error),
        }
    }

    /// True when the panic means the client went away mid-response
    pub fn is_suppressed(&self) -> bool {
        match self {
            PanicValue::Network { system_message, .. } => {
                let lowered = system_message.to_lowercase();
                DISCONNECT_CONDITIONS
                    .iter()
                    .any(|condition| lowered.contains(condition))
            }
            _ => false,
        }
    }

    /// Textual rendering of the payload
    pub fn message(&self) -> String {
        match self {
            PanicValue::Network { error, .. } => error.to_string(),
            PanicValue::Error(error) => error.to_string(),
            PanicValue::Message(message) => (*message).to_string(),
            PanicValue::Opaque => OPAQUE_PANIC_MESSAGE.to_string(),
        }
    }

    /// The payload as an error, when it is one
    pub fn as_error(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PanicValue::Network { error, .. } => Some(*error),
            PanicValue::Error(error) => Some(*error),
            PanicValue::Message(_) | PanicValue::Opaque => None,
        }
    }

    /// Short label for logs and tags
    pub fn kind(&self) -> &'static str {
        match self {
            PanicValue::Network { .. } => "network",
            PanicValue::Error(_) => "error",
            PanicValue::Message(_) => "message",
            PanicValue::Opaque => "opaque",
        }
    }
}

/// Kinds raised by socket operations
const NETWORK_KINDS: [io::ErrorKind; 8] = [
    io::ErrorKind::BrokenPipe,
    io::ErrorKind::ConnectionReset,
    io::ErrorKind::ConnectionAborted,
    io::ErrorKind::ConnectionRefused,
    io::ErrorKind::NotConnected,
    io::ErrorKind::TimedOut,
    io::ErrorKind::AddrInUse,
    io::ErrorKind::AddrNotAvailable,
];

/// The system error behind an I/O error, if it came from the OS or a socket.
///
/// An error qualifies when it carries an OS error code, has a network kind, or
/// wraps an I/O error that carries an OS error code. Its wrapped error's text
/// is preferred over the kind's generic description.
fn system_error_message(error: &io::Error) -> Option<String> {
    if error.raw_os_error().is_some() {
        return Some(error.to_string());
    }

    let inner = error.get_ref();
    let wraps_os_error = inner
        .and_then(|inner| inner.downcast_ref::<io::Error>())
        .is_some_and(|inner| inner.raw_os_error().is_some());

    if wraps_os_error || NETWORK_KINDS.contains(&error.kind()) {
        return Some(match inner {
            Some(inner) => inner.to_string(),
            None => error.to_string(),
        });
    }
    None
}

/// Whether a panic payload is a client-disconnect that must not be reported
pub fn is_suppressed(payload: &(dyn Any + Send)) -> bool {
    PanicValue::classify(payload).is_suppressed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload<T: Any + Send>(value: T) -> Box<dyn Any + Send> {
        Box::new(value)
    }

    #[test]
    fn test_wrapped_broken_pipe_is_suppressed() {
        let value = payload(io::Error::new(io::ErrorKind::BrokenPipe, "write: broken pipe"));
        let panic = PanicValue::classify(value.as_ref());

        assert!(matches!(panic, PanicValue::Network { .. }));
        assert!(panic.is_suppressed());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let value = payload(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "read tcp 10.0.0.1:443: Connection Reset By Peer",
        ));
        assert!(is_suppressed(value.as_ref()));

        let value = payload(io::Error::new(io::ErrorKind::BrokenPipe, "WRITE: BROKEN PIPE"));
        assert!(is_suppressed(value.as_ref()));
    }

    #[cfg(unix)]
    #[test]
    fn test_os_errors_are_suppressed() {
        // EPIPE
        let value = payload(io::Error::from_raw_os_error(32));
        assert!(is_suppressed(value.as_ref()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_connection_reset_os_error_is_suppressed() {
        // ECONNRESET
        let value = payload(io::Error::from_raw_os_error(104));
        assert!(is_suppressed(value.as_ref()));
    }

    #[test]
    fn test_boxed_io_error_is_inspected() {
        let error: Box<dyn StdError + Send + Sync> =
            Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"));
        assert!(is_suppressed(payload(error).as_ref()));
    }

    #[test]
    fn test_plain_strings_are_reportable() {
        let value = payload("write: broken pipe");
        let panic = PanicValue::classify(value.as_ref());
        assert!(matches!(panic, PanicValue::Message("write: broken pipe")));
        assert!(!panic.is_suppressed());

        let value = payload(String::from("connection reset by peer"));
        assert!(!is_suppressed(value.as_ref()));
    }

    #[test]
    fn test_other_network_errors_are_reportable() {
        let value = payload(io::Error::new(io::ErrorKind::TimedOut, "dial tcp: i/o timeout"));
        let panic = PanicValue::classify(value.as_ref());
        assert_eq!(panic.kind(), "network");
        assert!(!panic.is_suppressed());
    }

    #[test]
    fn test_bare_network_kind_is_suppressed() {
        let value = payload(io::Error::from(io::ErrorKind::BrokenPipe));
        let panic = PanicValue::classify(value.as_ref());
        assert_eq!(panic.kind(), "network");
        assert!(panic.is_suppressed());
    }

    #[test]
    fn test_non_network_io_errors_are_plain_errors() {
        let value = payload(io::Error::new(io::ErrorKind::Other, "disk full"));
        let panic = PanicValue::classify(value.as_ref());
        assert!(matches!(panic, PanicValue::Error(_)));
        assert_eq!(panic.kind(), "error");

        // Disconnect wording alone does not make an error a network error
        let value = payload(io::Error::new(io::ErrorKind::Other, "write: broken pipe"));
        let panic = PanicValue::classify(value.as_ref());
        assert_eq!(panic.kind(), "error");
        assert!(!panic.is_suppressed());

        let value = payload(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(PanicValue::classify(value.as_ref()).kind(), "error");
    }

    #[cfg(unix)]
    #[test]
    fn test_wrapped_os_error_is_network() {
        // EPIPE behind a custom error
        let value = payload(io::Error::new(io::ErrorKind::Other, io::Error::from_raw_os_error(32)));
        let panic = PanicValue::classify(value.as_ref());
        assert_eq!(panic.kind(), "network");
        assert!(panic.is_suppressed());
    }

    #[test]
    fn test_error_values_are_reportable() {
        let value = payload(anyhow::anyhow!("broken pipe somewhere else"));
        let panic = PanicValue::classify(value.as_ref());
        assert_eq!(panic.kind(), "error");
        assert!(!panic.is_suppressed());
        assert!(panic.as_error().is_some());
        assert_eq!(panic.message(), "broken pipe somewhere else");
    }

    #[test]
    fn test_opaque_payloads() {
        let value = payload(42_u32);
        let panic = PanicValue::classify(value.as_ref());
        assert!(matches!(panic, PanicValue::Opaque));
        assert!(!panic.is_suppressed());
        assert!(panic.as_error().is_none());
        assert_eq!(panic.message(), OPAQUE_PANIC_MESSAGE);
    }
}

//! The `utils` module collects the shared pieces used across `popsub-udp`:
//! the error taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::{ClientError, FrameError};

#[cfg(test)]
mod tests {
    use super::error::{ClientError, FrameError};
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        logging::init("info");
        logging::init("debug");
        logging::init("bogus");
    }

    #[test]
    fn logging_level_names_map_to_directives() {
        assert_eq!(logging::level_directive("WARNING"), "warn");
        assert_eq!(logging::level_directive("Debug"), "debug");
        assert_eq!(logging::level_directive("trace"), "trace");
        assert_eq!(logging::level_directive("bogus"), "info");
    }

    #[test]
    fn frame_error_converts_into_client_error() {
        let err: ClientError = FrameError::PayloadTooLarge {
            size: 2000,
            max: 1024,
        }
        .into();
        assert!(matches!(
            err,
            ClientError::Frame(FrameError::PayloadTooLarge { size: 2000, .. })
        ));
        assert_eq!(
            err.to_string(),
            "frame of 2000 bytes exceeds the 1024 byte datagram limit"
        );
    }

    #[test]
    fn port_in_use_names_the_port() {
        let err = ClientError::PortInUse { port: 11011 };
        assert_eq!(err.to_string(), "inbound port 11011 is already in use");
    }
}

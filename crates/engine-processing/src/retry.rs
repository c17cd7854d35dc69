use connectors::error::{SinkError, TransferError};
use engine_core::retry::RetryDisposition;

pub fn classify_sink_error(err: &SinkError) -> RetryDisposition {
    match err {
        SinkError::Timeout(_)
        | SinkError::Connection(_)
        | SinkError::Io(_)
        | SinkError::Transient(_) => RetryDisposition::Retry,
        SinkError::Status { status, .. } => classify_status(*status),
        SinkError::Transfer(transfer_err) => classify_transfer_error(transfer_err),
        SinkError::Auth(_) => RetryDisposition::Stop,
        SinkError::Rejected(_) => RetryDisposition::Stop,
        SinkError::Serialization(_) => RetryDisposition::Stop,
        SinkError::Terminal(_) => RetryDisposition::Stop,
    }
}

pub fn classify_transfer_error(err: &TransferError) -> RetryDisposition {
    match err {
        TransferError::Connection(_)
        | TransferError::Timeout(_)
        | TransferError::Stalled { .. }
        | TransferError::Io(_) => RetryDisposition::Retry,
        // Expected files may not have been uploaded yet.
        TransferError::NotFound(_) => RetryDisposition::Retry,
        TransferError::Http { status, .. } => classify_status(*status),
        TransferError::InvalidPath(_) => RetryDisposition::Stop,
        TransferError::UnknownLength(_) => RetryDisposition::Stop,
    }
}

/// 408, 429 and 5xx are transient; any other status is final.
pub fn classify_status(status: u16) -> RetryDisposition {
    match status {
        408 | 429 | 500..=599 => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(classify_status(503), RetryDisposition::Retry);
        assert_eq!(classify_status(429), RetryDisposition::Retry);
        assert_eq!(classify_status(408), RetryDisposition::Retry);
        assert_eq!(classify_status(400), RetryDisposition::Stop);
        assert_eq!(classify_status(404), RetryDisposition::Stop);
    }

    #[test]
    fn auth_and_malformed_payloads_are_terminal() {
        assert_eq!(
            classify_sink_error(&SinkError::Auth("401".into())),
            RetryDisposition::Stop
        );
        assert_eq!(
            classify_sink_error(&SinkError::Rejected("bad json".into())),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn stalls_inside_sink_errors_are_retried() {
        let err = SinkError::Transfer(TransferError::Stalled {
            path: "a.csv".into(),
            secs: 60,
        });
        assert_eq!(classify_sink_error(&err), RetryDisposition::Retry);
    }
}

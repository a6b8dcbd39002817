//! Error taxonomy and not-found classification / 错误类型与"对象不存在"判定

use thiserror::Error;

/// Errors produced by bucket operations / 存储桶操作错误
#[derive(Error, Debug)]
pub enum ObjStoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("insufficient oss configuration, missing: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("invalid range: offset={offset}, length={length}")]
    InvalidRange { offset: i64, length: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error (status={}, code={}): {message}", or_dash(.status), or_dash(.code))]
    Backend {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ObjStoreError {
    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = error_code_from_body(&message);
        ObjStoreError::Backend { status, code, message }
    }

    /// Whether this error, on its own, means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ObjStoreError::NotFound(_) => true,
            ObjStoreError::Backend { status, code, .. } => {
                *status == Some(404) || code.as_deref() == Some("NoSuchKey")
            }
            _ => false,
        }
    }
}

fn or_dash<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Extract `<Code>...</Code>` from an S3 XML error body.
pub(crate) fn error_code_from_body(body: &str) -> Option<String> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    let code = body[start..end].trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Returns true only if the error chain says the object is absent.
///
/// Typed errors are authoritative: if any `ObjStoreError` is present in the
/// chain, the answer comes from it alone. Foreign errors fall back to
/// inspecting the rendered message.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    let mut saw_typed = false;
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ObjStoreError>() {
            if e.is_not_found() {
                return true;
            }
            saw_typed = true;
        }
    }
    !saw_typed && message_reports_404(&format!("{:#}", err))
}

// Last resort for errors that only carry a status in their text.
fn message_reports_404(msg: &str) -> bool {
    msg.contains("StatusCode=404")
}

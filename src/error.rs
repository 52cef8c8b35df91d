//! 统一错误类型
//!
//! 所有跨越 WalletManager 边界的错误都收敛到 [`SdkError`]，
//! UI 层可以按错误码区分"历史已到底"和"限流/网络失败"。

use thiserror::Error;

/// 载荷片段的最大长度（日志与错误信息中使用）
pub const SNIPPET_LIMIT: usize = 256;

/// 浏览器 API 业务错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerApiError {
    /// 浏览器返回限流提示
    #[error("explorer rate limit reached")]
    RateLimited,
    /// 成功但为空的页面，表示没有更多历史
    #[error("end of transaction history")]
    EndOfHistory,
    #[error("explorer error: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum SdkError {
    // 传输层错误（调用方可重试）
    #[error("transport error at {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    // 协议/解码错误
    #[error("failed to decode {context}: {snippet}")]
    Decoding { context: String, snippet: String },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    // 领域错误
    #[error(transparent)]
    Explorer(#[from] ExplorerApiError),
    #[error("no fee available")]
    NoFeeAvailable,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),
    #[error("signer failed: {0}")]
    Signer(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("not implemented")]
    NotImplemented,
}

pub type Result<T> = std::result::Result<T, SdkError>;

impl SdkError {
    pub fn transport(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// 构造解码错误，载荷会被截断
    pub fn decoding(context: impl Into<String>, payload: &str) -> Self {
        Self::Decoding {
            context: context.into(),
            snippet: snippet(payload),
        }
    }

    /// 稳定的错误码，供 UI 层做告警映射
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Decoding { .. } => "decoding",
            Self::Rpc { .. } => "rpc_error",
            Self::Explorer(ExplorerApiError::RateLimited) => "rate_limit",
            Self::Explorer(ExplorerApiError::EndOfHistory) => "end_of_history",
            Self::Explorer(ExplorerApiError::Unknown(_)) => "explorer_error",
            Self::NoFeeAvailable => "no_fee_available",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidPublicKey(_) => "invalid_public_key",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InsufficientFunds => "insufficient_funds",
            Self::UnsupportedChain(_) => "chain_not_supported",
            Self::InvalidDerivationPath(_) => "invalid_derivation_path",
            Self::Signer(_) => "signer_error",
            Self::Cancelled => "cancelled",
            Self::NotImplemented => "not_implemented",
        }
    }

    /// 仅传输层错误允许调用方重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".into());
        if err.is_timeout() {
            Self::Timeout { endpoint }
        } else if err.is_decode() {
            Self::decoding("response body", &err.to_string())
        } else {
            Self::Transport {
                endpoint,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        Self::decoding("json", &err.to_string())
    }
}

/// 截断载荷，避免日志中出现整页响应
pub fn snippet(payload: &str) -> String {
    if payload.len() <= SNIPPET_LIMIT {
        return payload.to_string();
    }
    let mut end = SNIPPET_LIMIT;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &payload[..end])
}

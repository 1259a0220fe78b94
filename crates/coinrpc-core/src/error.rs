#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("authentication failure")]
    AuthenticationFailure,

    #[error("the endpoint either does not support websockets or does not exist")]
    InvalidEndpoint,

    /// A streaming client was created but never attached to a connection.
    /// Differs from `ClientDisconnected`, which is an established
    /// connection that was lost.
    #[error("the client was never connected")]
    ClientNotConnected,

    #[error("the client has been disconnected")]
    ClientDisconnected,

    #[error("the client has been shutdown")]
    ClientShutdown,

    #[error("client is not configured for websockets")]
    NotAWebsocketClient,

    #[error("websocket client has already connected")]
    AlreadyConnected,

    #[error("request cancelled by caller")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("failed to decode result: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("stream transport: {0}")]
    Stream(String),

    /// The reply body was not a JSON-RPC envelope.
    #[error("status code: {status}, response: {body:?}")]
    UnexpectedReply { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),
}

impl CoreError {
    /// Returns the structured server error code, if this is one.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::Rpc(RpcError::ServerError { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

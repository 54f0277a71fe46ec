// Public modules
pub mod chat_message_param;
pub mod chat_turn;
pub mod login_response;
pub mod register_params;
pub mod register_response;

// Re-exports
pub use chat_message_param::ChatMessageParam;
pub use chat_turn::ChatTurn;
pub use login_response::LoginResponse;
pub use register_params::RegisterParams;
pub use register_response::RegisterResponse;

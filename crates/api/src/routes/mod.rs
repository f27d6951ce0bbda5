pub mod event_stream;
pub mod messages;
pub mod stop;
pub mod upload;

pub mod chat_llm;
pub mod db;
pub mod mailer;
pub mod stt;
pub mod tts;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use mailer::HttpMailerAdapter;
pub use stt::OpenAiSttAdapter;
pub use tts::OpenAiTtsAdapter;

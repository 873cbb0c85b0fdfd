pub mod domain;
pub mod ports;

pub use domain::{
    ChatTurn, MessageKind, NewChatTurn, NewUser, ResetToken, User, UserCredentials,
};
pub use ports::{
    AssetStore, DatabaseService, GenerativeService, MailerService, PortError, PortResult,
    SpeechToTextService, TextToSpeechService,
};

pub mod envelope;
pub mod pack;
pub mod payload;
pub mod signaling;

pub use envelope::{decode, encode, Message, MessageBody, ProtocolError, PROTOCOL_VERSION};
pub use pack::{validate_questions, Answer, Choice, PackIssue, Question, QuestionType};
pub use payload::*;
pub use signaling::{AddressCandidate, SessionDescription};

pub mod credentials;
pub mod db;
pub mod feedback_llm;
pub mod local_store;

pub use db::DbAdapter;
pub use feedback_llm::OpenAiFeedbackAdapter;
pub use local_store::FileLocalStore;

pub mod envelope;
pub mod error;
pub mod sanitize;

pub use envelope::{extract_text, parse_agent_response, write_auth_json};
pub use error::{AgentError, AgentResult};
pub use sanitize::sanitize;

pub mod error;
pub mod interview;
pub mod model;
pub mod persona;
pub mod skills;

pub use error::{JobError, JobResult};
pub use interview::{InterviewQuestion, InterviewStep};
pub use model::{
    ConnectedRepo, CustomSkill, EventType, Provider, RepoStatus, Review, ReviewComment, Severity,
    Subscription, UserSettings, WebhookEvent,
};
pub use persona::render_system_prompt;
pub use skills::{Skill, SkillCategory, SkillsCatalog};

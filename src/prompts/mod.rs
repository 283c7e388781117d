pub mod builder;
pub mod canned;
pub mod loader;
pub mod templates;

pub use builder::{ExchangeContext, PromptBuilder};
pub use loader::PromptLoader;
pub use templates::{ProfessionTemplate, TemplateRegistry};

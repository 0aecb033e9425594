pub mod discovery;
pub mod extract;
pub mod service;
pub mod types;

pub use discovery::{DiscoveryConfig, FieldDiscovery};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use service::TemplateService;
pub use types::{
    build_replacements, validate_bindings, Field, ReplacementMap, SubstitutionStyle, Template,
    ValueBinding,
};

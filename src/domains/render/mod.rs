pub mod convert;
pub mod export;
pub mod instantiate;
pub mod office;
pub mod service;

pub use convert::{ConverterRegistry, FormatConverter};
pub use export::{Exporter, ExporterRegistry};
pub use instantiate::instantiate;
pub use office::OfficeConverter;
pub use service::RenderService;

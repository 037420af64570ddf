pub mod attachment;
pub mod event;

pub use attachment::{AttachmentMetadata, SizeVariant};
pub use event::{parse_reference_time, FileSetEvent, MediaEvent, UploadTask};

mod batch;
mod cancel;
mod config;
mod conflict;
mod disk;
mod error;
mod finalize;
mod fsops;
mod journal;
mod lock;
mod planner;
mod record;
mod sanitize;
mod template;

pub use batch::{BatchOutcome, BatchRenameExecutor};
pub use cancel::CancelFlag;
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    LibraryLayoutConfig,
};
pub use conflict::{is_backup_file, ConflictResolution, BACKUP_PREFIX};
pub use disk::{disk_space_info, DiskSpaceInfo};
pub use error::{
    BatchError, BatchStage, FinalizationError, FinalizationFailureKind, ValidationIssue,
};
pub use finalize::{
    EventKind, ItemAction, LibraryFinalizer, PostProcessingItemResult, PostProcessingOptions,
    PostProcessingSummary, ProcessingEvent,
};
pub use lock::LOCK_FILE_NAME;
pub use planner::{plan_renames, render_preview_sample, RenamePlan, RenameStats};
pub use record::{load_manifest, save_manifest, MediaRecord, MediaType, RenameOperation};
pub use sanitize::{sanitize_file_name, sanitize_segment};
pub use template::{
    parse_template, render, render_template, validate_template, TemplateError, TemplatePart,
    TemplateRenderer, TemplateSet, DEFAULT_MOVIE_TEMPLATE, DEFAULT_TV_TEMPLATE,
};

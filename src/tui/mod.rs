pub mod collection_browser;
pub mod collection_picker;

pub use collection_browser::CollectionBrowser;
pub use collection_picker::CollectionPicker;

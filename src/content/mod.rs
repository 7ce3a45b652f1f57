//! Article content collaborators.
//!
//! - [`page`]: main-content extraction by fetching the article page directly
//! - [`reader`]: the same through a reader service, opt-in by configuration
//! - [`tagger`]: named-entity detection over an article's title and text

mod page;
mod reader;
mod tagger;

pub use page::{extract_main_content, LinkCheck, PageExtractor};
pub use reader::{
    render_markdown, ContentError, ContentExtractor, ExtractedContent, ReaderClient,
    BROWSER_USER_AGENT, HOSTED_READER_BASE_URL,
};
pub use tagger::{
    tag_post, DisabledTagger, EntityTagger, HttpEntityTagger, TagError, NO_TAGS, TAG_TEXT_BUDGET,
};

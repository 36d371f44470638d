//! Turning result sets into pages, cursor pages or streamed JSON.

pub mod cursor;
pub mod offset;
pub mod stream;

pub use cursor::{
    CursorPage, CursorSource, CursorToken, SliceSource, create_token, paginate_cursor, parse_token,
};
pub use offset::{DEFAULT_LIMIT, DEFAULT_PAGE, Page, PageInfo, PageLinks, PageUrls, paginate};
pub use stream::{JsonArrayStream, stream_results};

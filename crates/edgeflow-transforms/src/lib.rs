pub mod conversion;
pub mod filter;
pub mod http;
pub mod response;
pub mod util;

pub use conversion::TransformToJson;
pub use filter::{FilterByDeviceName, FilterByResourceName};
pub use http::HttpSender;
pub use response::SetResponseData;
pub use util::coerce_type;

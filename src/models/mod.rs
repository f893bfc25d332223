pub mod pixel_buffer;
pub mod window;

pub use pixel_buffer::PixelBuffer;
pub use window::{BoxI, Detection, RawHit, Window};

//! Interactive image segmentation engine.
//!
//! A [`Segmenter`] owns one image, its segmentation mask and everything
//! needed to edit it: the viewport, the display pyramid, tags and the undo
//! log.  Hosts feed it pointer positions in canvas space and pull rendered
//! frames and save payloads back out.
#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod canvas;
pub mod components;
pub mod io;
pub mod ops;
pub mod overlay;
pub mod segmenter;
pub mod settings;
pub mod tags;
pub mod viewport;

pub use components::history::{UndoEntry, UndoLog};
pub use io::{JsonFileSink, LoadError, SaveError, SavePayload, SaveSink};
pub use ops::shapes::Paint;
pub use overlay::{OverlayCache, ToneMap};
pub use segmenter::{ImportError, LoadState, Segmenter};
pub use settings::SegmenterSettings;
pub use tags::{Tag, TagError, TagList};
pub use viewport::{Point, Viewport};

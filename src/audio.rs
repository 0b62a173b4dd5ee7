//! Audio I/O utilities.
//!
//! WAV read/write plus the mono/fixed-length preparation the audio encoder
//! expects (16 kHz by default, per the dataset config).

mod wav;

pub use wav::{chunk_or_pad, downmix_mono, read_wav, write_wav};

pub mod image_pair;
pub mod pair_store;
mod timestamp_index;

pub use image_pair::{decode_data_uri, encode_data_uri, ImagePair, ImageRole, NewImage};
pub use pair_store::ImagePairStore;

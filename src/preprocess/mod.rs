pub mod canvas;

pub use canvas::{encode_png, normalize_for_model, scaled_to_image, to_data_url, to_model_input};

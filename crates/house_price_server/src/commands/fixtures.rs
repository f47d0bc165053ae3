//! Model artifacts shared by the command tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use config::Config;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ml_model::ImageRegressorConfig;
use serde_json::json;

use crate::backend::{InferenceBackend, init_device};

/// Two stumps over `[living_area, bedrooms]` with a base score of 0.5:
/// `living_area=5, bedrooms=0` predicts 1.75.
pub fn write_tabular(dir: &Path) {
    let model = json!({
        "learner": {
            "feature_names": ["living_area", "bedrooms"],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "trees": [
                        {
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [0, 0, 0],
                            "split_conditions": [10.0, 1.0, 2.0],
                            "default_left": [1, 0, 0]
                        },
                        {
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [1, 0, 0],
                            "split_conditions": [0.5, 0.25, -0.5],
                            "default_left": [0, 0, 0]
                        }
                    ]
                }
            },
            "learner_model_param": {
                "base_score": "5E-1",
                "num_feature": "2",
                "num_target": "1"
            },
            "objective": { "name": "reg:squarederror" }
        }
    });

    std::fs::write(
        dir.join("xgboost_model.json"),
        serde_json::to_vec(&model).unwrap(),
    )
    .unwrap();
}

pub fn write_image_model(dir: &Path) {
    let config = ImageRegressorConfig::new()
        .with_base_channels(4)
        .with_num_blocks(2)
        .with_hidden_size(8);
    let model = config.init::<InferenceBackend>(&init_device());

    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    let weights = Recorder::<InferenceBackend>::record(&recorder, model.into_record(), ()).unwrap();

    std::fs::write(dir.join("price_model.mpk"), weights).unwrap();
    std::fs::write(
        dir.join("price_model.mpk.config.json"),
        serde_json::to_vec(&config).unwrap(),
    )
    .unwrap();
}

pub fn write_png(path: &Path) {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 12, Rgb([90, 160, 30])));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buffer).unwrap();
}

/// Configuration rooted at `dir` for the fixture models.
pub fn config(dir: &Path, vars: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    vars.insert(
        "MODEL_BASE_PATH".to_string(),
        dir.to_string_lossy().into_owned(),
    );
    vars.entry("TABULAR_FIELDS".to_string())
        .or_insert_with(|| "living_area,bedrooms".to_string());
    vars.entry("IMAGE_SIZE".to_string())
        .or_insert_with(|| "16".to_string());

    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

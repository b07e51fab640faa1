use forge_sdk::google::{GoogleModel, GoogleModelOptions};
use std::env;

pub fn get_model(model_id: &str) -> GoogleModel {
    GoogleModel::new(
        model_id,
        GoogleModelOptions {
            api_key: env::var("GOOGLE_API_KEY").expect("GOOGLE_API_KEY must be set"),
            base_url: env::var("GOOGLE_BASE_URL").ok(),
            ..Default::default()
        },
    )
}

use rand::distributions::Alphanumeric;
use rand::Rng;

pub const RESOURCE_NAME_PREFIX: &str = "test-acc-";
const RANDOM_SUFFIX_LEN: usize = 10;

/// Generates a unique lowercase name for a resource created by a test, so
/// that parallel runs against the same organization never collide.
pub fn generate_resource_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}{}", RESOURCE_NAME_PREFIX, suffix)
}

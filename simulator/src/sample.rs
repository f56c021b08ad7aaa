use rand::Rng;

/// One outgoing publish: topic plus plain-text payload.
#[derive(Debug, Clone)]
pub struct Sample {
    pub topic: String,
    pub payload: String,
}

pub fn generate_sample(rng: &mut impl Rng, device_id: &str, malformed_ratio: f64) -> Sample {
    let humidity = rng.gen_bool(0.5);
    let suffix = if humidity { "hum" } else { "temp" };

    let payload = if rng.gen_bool(malformed_ratio.clamp(0.0, 1.0)) {
        // The ingestor must log and skip these.
        ["oops", "", "NaN", "Infinity"][rng.gen_range(0..4)].to_string()
    } else if humidity {
        format!("{:.1}", rng.gen_range(30.0..80.0))
    } else if rng.gen_bool(0.05) {
        format!("{:.1}", rng.gen_range(-10.0..45.0)) // 5% outliers
    } else {
        format!("{:.1}", rng.gen_range(15.0..35.0))
    };

    Sample {
        topic: format!("sensor/{}/{}", device_id, suffix),
        payload,
    }
}

/// Whole minutes needed to cover `distance_km` at `speed_kmh`, rounded down.
pub fn estimate_minutes(distance_km: f64, speed_kmh: f64) -> u64 {
    if speed_kmh <= 0.0 || !distance_km.is_finite() {
        return 0;
    }

    (distance_km.max(0.0) / speed_kmh * 60.0).floor() as u64
}

pub fn format_eta(minutes: u64) -> String {
    format!("{minutes} minutes")
}

pub fn estimate_eta(distance_km: f64, speed_kmh: f64) -> String {
    format_eta(estimate_minutes(distance_km, speed_kmh))
}

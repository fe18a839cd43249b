use super::Spectrogram;

/// Smallest amplitude considered before taking the logarithm.
pub const AMIN: f32 = 1e-5;

/// Default dynamic range kept below the peak.
pub const DEFAULT_TOP_DB: f32 = 80.0;

/// Convert amplitudes to decibels relative to the matrix maximum.
///
/// Values are taken by absolute value and floored at [`AMIN`], so the small
/// negative entries a low-rank reconstruction produces are tolerated. The
/// result lies in `[-top_db, 0]` for any input with a positive peak.
pub fn amplitude_to_db(spec: &Spectrogram, top_db: f32) -> Spectrogram {
    let peak = spec.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let reference = 20.0 * peak.max(AMIN).log10();
    let db = spec.mapv(|v| 20.0 * v.abs().max(AMIN).log10() - reference);
    let floor = db.iter().copied().fold(f32::MIN, f32::max) - top_db;
    db.mapv(|v| v.max(floor))
}

use crate::common::*;
use rand_distr::StandardNormal;

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

/// Derive an independent seed for `stream` from a base seed.
///
/// It is the SplitMix64 finalizer applied to the combined value.
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn seeded_rng(seed: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(mix_seed(seed, stream))
}

/// Sample from a normal distribution with the given mean and standard
/// deviation.
pub fn sample_normal<R>(rng: &mut R, mean: f64, std: f64) -> f64
where
    R: Rng + ?Sized,
{
    let z: f64 = rng.sample(StandardNormal);
    mean + std * z
}

/// Write a file by writing to a hidden temporary sibling first and renaming
/// it into place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| format_err!("'{}' has no parent directory", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format_err!("'{}' has no valid file name", path.display()))?;
    let tmp = dir.join(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Local::now().timestamp_nanos()
    ));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.with_context(|| format!("failed to write '{}'", path.display()))
}

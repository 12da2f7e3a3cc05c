use super::RawExample;
use crate::{common::*, error::Error};

/// Stream raw examples from a JSON Lines file written by the generator.
///
/// Records are parsed one at a time, so the file is never loaded at once.
pub fn load_raw_jsonl(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<RawExample>>> {
    let path = path.as_ref();
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open raw examples '{}'", path.display()))?;
    let path = path.to_owned();

    let iter = serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<RawExample>()
        .enumerate()
        .map(move |(nth, result)| {
            result.map_err(|err| {
                Error::schema(format!(
                    "malformed raw example {} in '{}': {}",
                    nth,
                    path.display(),
                    err
                ))
            })
        });
    Ok(iter)
}

use anyhow::{Result, bail};
use regen::scan::Scanner;
use std::path::Path;

pub fn run(dir: &Path, json: bool) -> Result<()> {
    let result = Scanner::new(dir).scan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let mut entries: Vec<(&String, &String)> = result.path_to_uuid.iter().collect();
        entries.sort();
        for (path, uuid) in entries {
            println!("{uuid}  {path}");
        }
        for collision in &result.collisions {
            eprintln!(
                "Warning: generated-id {} found at multiple paths: {}",
                collision.uuid,
                collision.paths.join(", ")
            );
        }
    }

    if !result.collisions.is_empty() {
        bail!("{} generated-id collision(s)", result.collisions.len());
    }
    Ok(())
}

//! Markdown rendering of the episode stores into `index.md`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::repository::{EpisodeRepository, write_atomic};

const INDEX_BEGIN: &str = "<!-- Beginn Sachgeschichtenindex -->\n\n";
const INDEX_END: &str = "\n\n<!-- Ende Sachgeschichtenindex -->";
const MISSING_BEGIN: &str = "<!-- Beginn Fehlt -->\n\n";
const MISSING_END: &str = "\n\n<!-- Ende Fehlt -->";

const SKELETON: &str = "# Sachgeschichten\n\n\
<!-- Beginn Sachgeschichtenindex -->\n\n\n\n<!-- Ende Sachgeschichtenindex -->\n";

/// Renders a padded Markdown table; widths are measured in chars.
pub fn build_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render(headers.to_vec()));
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    lines.push(render(dashes.iter().map(String::as_str).collect()));
    for row in rows {
        let mut cells: Vec<&str> = row.iter().map(String::as_str).collect();
        cells.resize(widths.len(), "");
        lines.push(render(cells));
    }
    lines.join("\n")
}

/// Replaces the body of every `begin`..`end` pair. `None` if there is none.
fn replace_between(content: &str, begin: &str, end: &str, body: &str) -> Option<String> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    let mut replaced = false;
    while let Some(found) = rest.find(begin) {
        let start = found + begin.len();
        let Some(len) = rest[start..].find(end) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(body);
        rest = &rest[start + len..];
        replaced = true;
    }
    if !replaced {
        return None;
    }
    out.push_str(rest);
    Some(out)
}

/// Rewrites both generated sections of the index file.
pub fn update_index(path: &Path, repo: &EpisodeRepository) -> Result<()> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => SKELETON.to_string(),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };

    let downloaded: Vec<Vec<String>> = repo
        .all_downloaded()
        .into_iter()
        .map(|e| vec![e.title.clone(), e.year.clone(), e.presenter.clone(), e.duration.clone()])
        .collect();
    let missing: Vec<Vec<String>> = repo
        .all_missing()
        .into_iter()
        .map(|e| vec![e.title.clone(), e.year.clone(), e.presenter.clone()])
        .collect();

    let index_table = build_table(&["Titel", "Jahr", "Autor", "Dauer"], &downloaded);
    let missing_table = build_table(&["Titel", "Jahr", "Autor"], &missing);

    let content = replace_between(&content, INDEX_BEGIN, INDEX_END, &index_table)
        .with_context(|| format!("index markers not found in {}", path.display()))?;
    let content = match replace_between(&content, MISSING_BEGIN, MISSING_END, &missing_table) {
        Some(content) => content,
        None => format!(
            "{}\n\n\n## Fehlt\n\n{MISSING_BEGIN}{missing_table}{MISSING_END}\n",
            content.trim_end()
        ),
    };

    write_atomic(path, content.as_bytes())?;
    info!(
        path = %path.display(),
        downloaded = downloaded.len(),
        missing = missing.len(),
        "index updated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::Episode;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn table_pads_by_char_count() {
        let table = build_table(
            &["Titel", "Jahr"],
            &[row(&["Käse", "1990"]), row(&["Brot & Butter", "2020"])],
        );
        assert_eq!(
            table,
            "| Titel         | Jahr |\n\
             | ------------- | ---- |\n\
             | Käse          | 1990 |\n\
             | Brot & Butter | 2020 |"
        );
        assert_eq!(build_table(&["Titel"], &[]), "");
    }

    fn repo_with(dir: &Path) -> EpisodeRepository {
        let mut repo = EpisodeRepository::open(
            &dir.join("sachgeschichten.json"),
            &dir.join("sachgeschichten-missing.json"),
        )
        .unwrap();
        let mut brot = Episode::new("Brot", "2020", "Armin");
        brot.duration = "9:30".into();
        repo.upsert_downloaded(brot);
        repo.add_to_missing(Episode::new("Bagger", "1994", ""));
        repo
    }

    #[test]
    fn update_replaces_both_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.md");
        fs::write(
            &path,
            "# Index\n\n<!-- Beginn Sachgeschichtenindex -->\n\nalt\n\n<!-- Ende Sachgeschichtenindex -->\n\n\
             ## Fehlt\n\n<!-- Beginn Fehlt -->\n\nalt\n\n<!-- Ende Fehlt -->\n\nFooter\n",
        )
        .unwrap();

        update_index(&path, &repo_with(dir.path())).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("| Brot  | 2020 | Armin | 9:30  |"));
        assert!(content.contains("| Bagger | 1994 |       |"));
        assert!(!content.contains("alt"));
        assert!(content.ends_with("Footer\n"));
    }

    #[test]
    fn missing_section_is_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.md");
        fs::write(
            &path,
            "<!-- Beginn Sachgeschichtenindex -->\n\n\n\n<!-- Ende Sachgeschichtenindex -->\n\n\n",
        )
        .unwrap();

        update_index(&path, &repo_with(dir.path())).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(
            "<!-- Ende Sachgeschichtenindex -->\n\n\n## Fehlt\n\n<!-- Beginn Fehlt -->\n\n| Titel"
        ));
        assert!(content.ends_with("<!-- Ende Fehlt -->\n"));
    }

    #[test]
    fn absent_index_starts_from_skeleton() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.md");
        update_index(&path, &repo_with(dir.path())).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Sachgeschichten\n"));
        assert!(content.contains("| Brot "));
        assert!(content.contains("## Fehlt"));
    }

    #[test]
    fn every_marker_pair_is_replaced() {
        let content = "A\n<!-- Beginn Fehlt -->\n\nalt\n\n<!-- Ende Fehlt -->\nB\n\
                       <!-- Beginn Fehlt -->\n\nauch alt\n\n<!-- Ende Fehlt -->\nC\n";
        let replaced = replace_between(content, MISSING_BEGIN, MISSING_END, "neu").unwrap();
        assert_eq!(
            replaced,
            "A\n<!-- Beginn Fehlt -->\n\nneu\n\n<!-- Ende Fehlt -->\nB\n\
             <!-- Beginn Fehlt -->\n\nneu\n\n<!-- Ende Fehlt -->\nC\n"
        );
        assert_eq!(replace_between("kein Marker", MISSING_BEGIN, MISSING_END, "neu"), None);
    }

    #[test]
    fn file_without_markers_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.md");
        fs::write(&path, "nothing here\n").unwrap();
        assert!(update_index(&path, &repo_with(dir.path())).is_err());
    }
}

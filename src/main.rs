use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};

use docmerge::docx::document::{Document, TextScope};
use docmerge::docx::media;
use docmerge::docx::merge::{self, MergeSpec, SubstitutionWarning};
use docmerge::docx::package::Package;
use docmerge::docx::verify::verify_equivalent;
use docmerge::docx::xml::XmlPart;
use docmerge::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "docmerge")]
#[command(about = "Fill .docx templates: placeholder merge, find/replace, image swap, byte-faithful round trip", long_about = None)]
struct Args {
    /// Input .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: <input_stem>_merged.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Apply merge values from a TOML file (see README for the format)
    #[arg(long, value_name = "TOML")]
    merge: Option<PathBuf>,

    /// Write the merge report (per-key counts + warnings) as JSON
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Warn about `{TOKEN}` text still present after the merge
    #[arg(long)]
    warn_leftover: bool,

    /// Replace every occurrence of this text (requires --replace)
    #[arg(long, value_name = "TEXT")]
    find: Option<String>,

    /// Replacement text for --find
    #[arg(long, value_name = "TEXT")]
    replace: Option<String>,

    /// Paragraph scope for --find: body, headers, footers, textboxes, all
    #[arg(long, value_name = "SCOPE", default_value = "all")]
    scope: String,

    /// List image relationships (id, target, content type), then exit
    #[arg(long)]
    list_images: bool,

    /// Extract all image media into a directory
    #[arg(long, value_name = "DIR")]
    extract_images: Option<PathBuf>,

    /// Replace the media behind an image relationship id (e.g. rId4)
    #[arg(long, value_name = "REL_ID")]
    replace_image: Option<String>,

    /// Image file for --replace-image
    #[arg(long, value_name = "FILE")]
    image_file: Option<PathBuf>,

    /// Content type for --replace-image (default: inferred from extension)
    #[arg(long, value_name = "MIME")]
    image_content_type: Option<String>,

    /// Print the text of every paragraph of the main part, then exit
    #[arg(long)]
    paragraph_text: bool,

    /// Print the text of every textbox paragraph, then exit
    #[arg(long)]
    textbox_text: bool,

    /// Only parse + re-serialize every XML part and verify equivalence
    #[arg(long)]
    roundtrip_only: bool,

    /// Verify semantic equivalence of the input against this .docx, then exit
    #[arg(long, value_name = "DOCX")]
    verify: Option<PathBuf>,

    /// Suppress progress output (warnings still print)
    #[arg(short, long)]
    quiet: bool,
}

fn parse_scope(s: &str) -> anyhow::Result<TextScope> {
    match s {
        "body" => Ok(TextScope::Body),
        "headers" => Ok(TextScope::Headers),
        "footers" => Ok(TextScope::Footers),
        "textboxes" => Ok(TextScope::Textboxes),
        "all" => Ok(TextScope::All),
        other => bail!("unknown scope: {other} (body|headers|footers|textboxes|all)"),
    }
}

fn warning_line(w: &SubstitutionWarning) -> String {
    match w {
        SubstitutionWarning::UnmatchedKey { key } => {
            format!("merge key matched nothing: {key}")
        }
        SubstitutionWarning::LeftoverToken { token } => {
            format!("token still present after merge: {token}")
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docmerge <template.docx> --merge values.toml -o filled.docx\n\nTIPS:\n  - Text keys are matched verbatim; write them as {{TOKEN}} in the template.\n  - Image keys are relationship ids; find them with --list-images.\n"
            );
            return Ok(());
        }
    };

    if let Some(other) = args.verify.as_ref() {
        verify_equivalent(&input, other)?;
        progress.info(format!(
            "equivalent: {} == {}",
            input.display(),
            other.display()
        ));
        return Ok(());
    }

    if args.paragraph_text || args.textbox_text || args.list_images {
        let mut doc = Document::open(&input)?;
        if args.paragraph_text {
            for line in doc.paragraph_text()? {
                println!("{line}");
            }
        }
        if args.textbox_text {
            for line in doc.textbox_text()? {
                println!("{line}");
            }
        }
        if args.list_images {
            for img in doc.media_images() {
                println!(
                    "{}\t{}\t{}",
                    img.rel_id,
                    img.target,
                    img.content_type_label()
                );
            }
        }
        return Ok(());
    }

    let output = match args.output {
        Some(p) => p,
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            input.with_file_name(format!("{stem}_merged.docx"))
        }
    };

    if args.roundtrip_only {
        let mut pkg = Package::open(&input)?;
        let reserialized: Vec<(String, Vec<u8>)> = pkg
            .xml_entries()
            .filter(|e| !e.data.is_empty())
            .map(|e| {
                let part = XmlPart::parse(&e.name, &e.data)
                    .with_context(|| format!("parse xml: {}", e.name))?;
                Ok((e.name.clone(), part.serialize()))
            })
            .collect::<anyhow::Result<_>>()?;
        for (name, bytes) in reserialized {
            pkg.set_part(&name, bytes);
        }
        pkg.write(&output)?;
        verify_equivalent(&input, &output)?;
        progress.info(format!("round trip ok: {}", output.display()));
        return Ok(());
    }

    if args.find.is_some() != args.replace.is_some() {
        bail!("--find and --replace go together");
    }
    let wants_merge = args.merge.is_some();
    let wants_find = args.find.is_some();
    let wants_image = args.replace_image.is_some();
    let wants_extract = args.extract_images.is_some();
    if !(wants_merge || wants_find || wants_image || wants_extract || args.warn_leftover) {
        bail!(
            "nothing to do; pass --merge, --find/--replace, --replace-image, --extract-images or an inspection flag"
        );
    }
    if args.report.is_some() && !wants_merge {
        bail!("--report requires --merge");
    }

    let mut doc = Document::open(&input)?;
    let mut mutated = false;

    if let Some(merge_path) = args.merge.as_ref() {
        let spec = MergeSpec::from_toml_path(merge_path)?;
        let base_dir = merge_path.parent().unwrap_or(Path::new("."));
        let values = spec.into_placeholder_map(base_dir)?;
        let mut report = doc.merge(&values)?;
        if args.warn_leftover {
            let leftover = merge::scan_placeholders(&mut doc)?;
            report.note_leftovers(&leftover);
        }
        for w in &report.warnings {
            progress.warn(warning_line(w));
        }
        progress.info(format!(
            "merged {} substitution(s) across {} key(s)",
            report.total(),
            report.counts.len()
        ));
        if let Some(report_path) = args.report.as_ref() {
            let json = serde_json::to_string_pretty(&report).context("serialize merge report")?;
            std::fs::write(report_path, json)
                .with_context(|| format!("write report: {}", report_path.display()))?;
        }
        mutated = true;
    } else if args.warn_leftover {
        for token in merge::scan_placeholders(&mut doc)? {
            progress.warn(format!("unresolved token: {token}"));
        }
    }

    if let (Some(needle), Some(replacement)) = (args.find.as_ref(), args.replace.as_ref()) {
        let scope = parse_scope(&args.scope)?;
        let n = doc.find_replace(needle, replacement, scope)?;
        progress.info(format!("replaced {n} occurrence(s)"));
        mutated = true;
    }

    if let Some(rel_id) = args.replace_image.as_ref() {
        let image_file = args
            .image_file
            .as_ref()
            .context("--replace-image requires --image-file")?;
        let bytes = std::fs::read(image_file)
            .with_context(|| format!("read image: {}", image_file.display()))?;
        let content_type = match args.image_content_type.clone() {
            Some(ct) => ct,
            None => {
                let ext = image_file
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("");
                media::content_type_for_extension(ext)
                    .with_context(|| {
                        format!("cannot infer content type from {}", image_file.display())
                    })?
                    .to_string()
            }
        };
        doc.replace_image(rel_id, bytes, &content_type)?;
        progress.info(format!("replaced media behind {rel_id}"));
        mutated = true;
    }

    if let Some(dir) = args.extract_images.as_ref() {
        let outcomes = doc.extract_images(dir)?;
        let total = outcomes.len();
        let mut failed = 0usize;
        for (i, o) in outcomes.iter().enumerate() {
            match &o.result {
                Ok(()) => progress.progress(
                    &format!("{} -> {}", o.rel_id, o.path.display()),
                    i + 1,
                    total,
                ),
                Err(e) => {
                    failed += 1;
                    progress.warn(format!("{}: {e}", o.rel_id));
                }
            }
        }
        progress.info(format!(
            "extracted {}/{} image(s) to {}",
            outcomes.len() - failed,
            outcomes.len(),
            dir.display()
        ));
        if failed > 0 {
            bail!("{failed} image(s) failed to extract");
        }
    }

    if mutated {
        doc.save(&output)?;
        progress.info(format!("wrote {}", output.display()));
    }
    Ok(())
}

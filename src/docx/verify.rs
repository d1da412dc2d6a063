use std::path::Path;

use anyhow::{bail, Context};

use crate::docx::package::{is_xml_part_name, Package};
use crate::docx::xml::XmlPart;

/// Checks that two docx files hold the same content: same entries in the
/// same order with the same zip metadata, byte-identical non-XML parts,
/// and XML parts equal by content hash (attribute order and entity
/// spelling may differ).
pub fn verify_equivalent(a_path: &Path, b_path: &Path) -> anyhow::Result<()> {
    let a = Package::open(a_path).with_context(|| format!("open {}", a_path.display()))?;
    let b = Package::open(b_path).with_context(|| format!("open {}", b_path.display()))?;
    if a.entries().len() != b.entries().len() {
        bail!(
            "entry count differs: {} vs {}",
            a.entries().len(),
            b.entries().len()
        );
    }
    for (ea, eb) in a.entries().iter().zip(b.entries().iter()) {
        if ea.name != eb.name {
            bail!("entry order differs: {} vs {}", ea.name, eb.name);
        }
        if ea.is_dir != eb.is_dir {
            bail!("{}: directory flag differs", ea.name);
        }
        if ea.compression != eb.compression {
            bail!("{}: compression differs", ea.name);
        }
        if ea.last_modified != eb.last_modified {
            bail!("{}: timestamp differs", ea.name);
        }
        if ea.is_dir {
            continue;
        }
        if is_xml_part_name(&ea.name) {
            let pa = XmlPart::parse(&ea.name, &ea.data)?;
            let pb = XmlPart::parse(&eb.name, &eb.data)?;
            if pa.content_hash() != pb.content_hash() {
                bail!("{}: xml content differs", ea.name);
            }
        } else if ea.data != eb.data {
            bail!("{}: bytes differ", ea.name);
        }
    }
    Ok(())
}

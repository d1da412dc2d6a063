use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::docx::error::ArchiveError;

/// One archive entry, with the zip metadata needed to write it back
/// unchanged: compression method, timestamp, unix mode, directory flag.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

/// A docx container held fully in memory. Entry order is the order of the
/// source archive; parts added later follow the originals in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<PackageEntry>,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let f = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_archive(BufReader::new(f), path)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        Self::read_archive(Cursor::new(bytes), Path::new("<memory>"))
    }

    fn read_archive<R: Read + Seek>(reader: R, origin: &Path) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(reader).map_err(|source| ArchiveError::NotAZip {
            path: origin.to_path_buf(),
            source,
        })?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(|source| ArchiveError::Corrupt {
                name: format!("#{i}"),
                source,
            })?;
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|source| ArchiveError::Corrupt {
                    name: name.clone(),
                    source: source.into(),
                })?;
            entries.push(PackageEntry {
                name,
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|e| !e.is_dir && e.name == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Replaces an existing part's bytes in place, or appends a new deflated
    /// entry after the originals.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(ent) = self.entries.iter_mut().find(|e| !e.is_dir && e.name == name) {
            ent.data = data;
            return;
        }
        self.entries.push(PackageEntry {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        });
    }

    pub fn xml_entries(&self) -> impl Iterator<Item = &PackageEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && is_xml_part_name(&e.name))
    }

    /// Writes the archive to a temp file next to `path` and renames it into
    /// place, so an existing file at `path` is replaced only on full success
    /// and no partial output survives a failure.
    pub fn write(&self, path: &Path) -> Result<(), ArchiveError> {
        let tmp = temp_sibling(path);
        let write_err = |source: zip::result::ZipError| ArchiveError::Write {
            path: path.to_path_buf(),
            source,
        };
        let f = File::create(&tmp).map_err(|e| write_err(e.into()))?;
        if let Err(e) = self.write_entries(f) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e.into()));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut buf = Cursor::new(Vec::new());
        self.write_entries(&mut buf)
            .map_err(|source| ArchiveError::Write {
                path: PathBuf::from("<memory>"),
                source,
            })?;
        Ok(buf.into_inner())
    }

    fn write_entries<W: Write + Seek>(&self, writer: W) -> Result<(), zip::result::ZipError> {
        let mut zout = ZipWriter::new(writer);
        for ent in &self.entries {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)?;
            } else {
                zout.start_file(&ent.name, opts)?;
                zout.write_all(&ent.data).map_err(zip::result::ZipError::from)?;
            }
        }
        zout.finish()?;
        Ok(())
    }
}

pub fn is_xml_part_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".rels")
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

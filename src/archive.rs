// src/archive.rs

//! Uniform read access to artifact containers
//!
//! Zip-family artifacts (`.zip`, `.whl`, `.egg`) are read through a zip
//! central directory. Tarballs (`.tar.gz`, `.tgz`, `.tar.bz2`, `.tar`) are
//! streams, so reading an entry re-opens the file and scans to it.

use crate::error::{Error, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use zip::ZipArchive;

/// List entries and read them by name
pub trait ArchiveReader {
    /// Entry names in archive order
    fn entry_names(&self) -> &[String];

    /// Read an entry's full contents
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>>;

    /// First entry whose name ends with `suffix`
    fn find_entry(&self, suffix: &str) -> Option<String> {
        self.entry_names()
            .iter()
            .find(|name| name.ends_with(suffix))
            .cloned()
    }
}

/// Container format, detected from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarBz2,
    Tar,
}

impl ArchiveFormat {
    /// Detect the format of `path` from its extension
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") || name.ends_with(".whl") || name.ends_with(".egg") {
            Ok(Self::Zip)
        } else if name.ends_with(".gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Ok(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(Error::UnsupportedArchive(format!(
                "{}. Expected .zip, .whl, .egg, .tar.gz, .tar.bz2 or .tar",
                path.display()
            )))
        }
    }
}

/// Open `path` with the reader matching its extension
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>> {
    match ArchiveFormat::detect(path)? {
        ArchiveFormat::Zip => Ok(Box::new(ZipReader::open(path)?)),
        format => Ok(Box::new(TarReader::open(path, format)?)),
    }
}

/// Reader over a zip central directory
pub struct ZipReader {
    archive: ZipArchive<BufReader<File>>,
    names: Vec<String>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            Error::ParseError(format!("Failed to read zip {}: {}", path.display(), e))
        })?;
        let names = archive.file_names().map(str::to_string).collect::<Vec<_>>();
        debug!("Opened zip {} ({} entries)", path.display(), names.len());
        Ok(Self { archive, names })
    }
}

impl ArchiveReader for ZipReader {
    fn entry_names(&self) -> &[String] {
        &self.names
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| Error::ParseError(format!("Zip entry {}: {}", name, e)))?;
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        Ok(content)
    }
}

/// Reader over a (possibly compressed) tar stream
pub struct TarReader {
    path: PathBuf,
    format: ArchiveFormat,
    names: Vec<String>,
}

impl TarReader {
    pub fn open(path: &Path, format: ArchiveFormat) -> Result<Self> {
        let mut reader = Self {
            path: path.to_path_buf(),
            format,
            names: Vec::new(),
        };

        let mut archive = reader.stream()?;
        let mut names = Vec::new();
        for entry in archive.entries().map_err(|e| reader.tar_error(e))? {
            let entry = entry.map_err(|e| reader.tar_error(e))?;
            let entry_path = entry.path().map_err(|e| reader.tar_error(e))?;
            names.push(entry_path.to_string_lossy().to_string());
        }

        debug!("Opened tarball {} ({} entries)", path.display(), names.len());
        reader.names = names;
        Ok(reader)
    }

    fn stream(&self) -> Result<Archive<Box<dyn Read>>> {
        let file = BufReader::new(File::open(&self.path)?);
        let reader: Box<dyn Read> = match self.format {
            ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(file)),
            ArchiveFormat::Tar => Box::new(file),
            ArchiveFormat::Zip => {
                return Err(Error::UnsupportedArchive(format!(
                    "{} is not a tarball",
                    self.path.display()
                )));
            }
        };
        Ok(Archive::new(reader))
    }

    fn tar_error(&self, e: std::io::Error) -> Error {
        Error::ParseError(format!("Failed to read tarball {}: {}", self.path.display(), e))
    }
}

impl ArchiveReader for TarReader {
    fn entry_names(&self) -> &[String] {
        &self.names
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.stream()?;
        for entry in archive.entries().map_err(|e| self.tar_error(e))? {
            let mut entry = entry.map_err(|e| self.tar_error(e))?;
            let matches = entry
                .path()
                .map(|p| p.to_string_lossy() == name)
                .unwrap_or(false);
            if matches {
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                return Ok(content);
            }
        }
        Err(Error::NotFoundError(format!(
            "{} has no entry {}",
            self.path.display(),
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tar<W: Write>(writer: W, files: &[(&str, &str)]) -> W {
        let mut builder = tar::Builder::new(writer);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_detect_format() {
        let detect = |name: &str| ArchiveFormat::detect(Path::new(name)).ok();
        assert_eq!(detect("foo-1.0.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(detect("foo-1.0-py3-none-any.whl"), Some(ArchiveFormat::Zip));
        assert_eq!(detect("foo-1.0.tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(detect("foo-1.0.tgz"), Some(ArchiveFormat::TarGz));
        assert_eq!(detect("foo-1.0.tar.bz2"), Some(ArchiveFormat::TarBz2));
        assert_eq!(detect("FOO-1.0.TAR.GZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(detect("foo-1.0.tar"), Some(ArchiveFormat::Tar));
        assert_eq!(detect("foo-1.0.rpm"), None);
    }

    #[test]
    fn test_unsupported_extension_error() {
        let result = open_archive(Path::new("/nonexistent/foo.exe"));
        assert!(matches!(result, Err(Error::UnsupportedArchive(_))));
    }

    #[test]
    fn test_tar_gz_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg-1.0.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        write_tar(encoder, &[("pkg-1.0/setup.py", "setup()"), ("pkg-1.0/PKG-INFO", "Name: pkg")])
            .finish()
            .unwrap();

        let mut reader = open_archive(&path).unwrap();
        assert_eq!(
            reader.entry_names(),
            &["pkg-1.0/setup.py".to_string(), "pkg-1.0/PKG-INFO".to_string()]
        );
        assert_eq!(reader.find_entry("PKG-INFO").as_deref(), Some("pkg-1.0/PKG-INFO"));
        assert_eq!(reader.read_entry("pkg-1.0/PKG-INFO").unwrap(), b"Name: pkg");
        assert!(reader.read_entry("pkg-1.0/missing").is_err());
    }

    #[test]
    fn test_tar_bz2_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg-1.0.tar.bz2");
        let encoder = bzip2::write::BzEncoder::new(
            File::create(&path).unwrap(),
            bzip2::Compression::default(),
        );
        write_tar(encoder, &[("pkg-1.0/README", "hello")])
            .finish()
            .unwrap();

        let mut reader = open_archive(&path).unwrap();
        assert_eq!(reader.read_entry("pkg-1.0/README").unwrap(), b"hello");
    }

    #[test]
    fn test_zip_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg-1.0.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("pkg-1.0/a.txt", options).unwrap();
        zip.write_all(b"first").unwrap();
        zip.start_file("pkg-1.0/b.txt", options).unwrap();
        zip.write_all(b"second").unwrap();
        zip.finish().unwrap();

        let mut reader = open_archive(&path).unwrap();
        assert_eq!(reader.entry_names().len(), 2);
        assert_eq!(reader.find_entry("b.txt").as_deref(), Some("pkg-1.0/b.txt"));
        assert_eq!(reader.read_entry("pkg-1.0/b.txt").unwrap(), b"second");
        assert_eq!(reader.find_entry("c.txt"), None);
    }

    #[test]
    fn test_corrupt_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(open_archive(&path), Err(Error::ParseError(_))));
    }
}

// src/test_support.rs

//! Builders for in-memory .deb fixtures used by unit tests

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use tar::{EntryType, Header};

/// Entry to place in a test tar member
pub(crate) enum TarEntry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8], u32),
    Symlink(&'a str, &'a str),
}

/// Gzip-compressed tar holding `entries`
pub(crate) fn tar_gz(entries: &[TarEntry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for entry in entries {
        let mut header = Header::new_gnu();
        match entry {
            TarEntry::Dir(path) => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                append_raw(&mut builder, &mut header, path, std::io::empty());
            }
            TarEntry::File(path, data, mode) => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                append_raw(&mut builder, &mut header, path, *data);
            }
            TarEntry::Symlink(path, target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                header.set_link_name(target).unwrap();
                append_raw(&mut builder, &mut header, path, std::io::empty());
            }
        }
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Append with the name stored verbatim, `./` prefix included, the way
/// dpkg-deb writes it
fn append_raw<W: Write, R: Read>(builder: &mut tar::Builder<W>, header: &mut Header, path: &str, data: R) {
    let name = &mut header.as_old_mut().name;
    name[..path.len()].copy_from_slice(path.as_bytes());
    header.set_cksum();
    builder.append(header, data).unwrap();
}

/// AR archive with the given members, in order
pub(crate) fn build_deb_with_members(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut builder = ar::Builder::new(&mut out);
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, data.as_slice()).unwrap();
        }
    }
    out
}

/// Complete .deb with a control stanza and a payload
pub(crate) fn build_deb(control: &str, payload: &[TarEntry<'_>]) -> Vec<u8> {
    let control_tar = tar_gz(&[TarEntry::File("./control", control.as_bytes(), 0o644)]);
    let data_tar = tar_gz(payload);

    build_deb_with_members(&[
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", control_tar),
        ("data.tar.gz", data_tar),
    ])
}

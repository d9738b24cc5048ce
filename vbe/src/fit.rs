//! FIT image lookup
//!
//! Finds the firmware image for a boot phase in a FIT and works out where
//! its data lives. Data may be embedded in the tree or stored after it:
//!
//! ```text
//!   data-position = <n>   n bytes from the start of the FIT
//!   data-offset   = <n>   n bytes after the 4-byte aligned end of the tree
//!   data          = [..]  inside the tree
//! ```
//!
//! The `load` property is not used; images are left where they are staged.

use crate::error::{Result, VbeError};
use crate::fdt::Fdt;

/// Firmware phase an image is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Any phase; the first listed image is used
    None,
    Tpl,
    Vpl,
    Spl,
    UBoot,
}

impl Phase {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tpl => "tpl",
            Self::Vpl => "vpl",
            Self::Spl => "spl",
            Self::UBoot => "u-boot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "tpl" => Some(Self::Tpl),
            "vpl" => Some(Self::Vpl),
            "spl" => Some(Self::Spl),
            "u-boot" => Some(Self::UBoot),
            _ => None,
        }
    }
}

/// Where an image's data sits, relative to the start of the FIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageData<'a> {
    /// Image node name
    pub name: &'a str,
    pub offset: usize,
    pub size: usize,
    /// Stored after the tree rather than inside it
    pub external: bool,
}

impl ImageData<'_> {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Configuration property lists searched for firmware, in order
const IMAGE_PROPS: [&str; 2] = ["firmware", "loadables"];

/// Find the image for `phase` in the default configuration.
///
/// `firmware` is searched before `loadables`. Within a list the first
/// image whose `phase` matches, or that has no `phase`, wins.
pub fn find_image<'a>(fit: &Fdt<'a>, phase: Phase) -> Result<ImageData<'a>> {
    let confs = fit
        .find_node("/configurations")
        .ok_or(VbeError::ImageNotFound)?;
    let default = confs.prop_str("default").ok_or(VbeError::ImageNotFound)?;
    let conf = confs.subnode(default).ok_or(VbeError::ImageNotFound)?;
    let images = fit.find_node("/images").ok_or(VbeError::ImageNotFound)?;

    for prop in IMAGE_PROPS {
        let Some(list) = conf.property(prop) else {
            continue;
        };
        for uname in list.strings() {
            let image = images.subnode(uname).ok_or(VbeError::ImageNotFound)?;
            let matches = phase == Phase::None
                || match image.prop_str("phase") {
                    None => true,
                    Some(name) => Phase::from_name(name).ok_or(VbeError::Invalid)? == phase,
                };
            if matches {
                return image_data(fit, image);
            }
        }
    }

    Err(VbeError::ImageNotFound)
}

fn image_data<'a>(fit: &Fdt<'a>, image: crate::fdt::Node<'a>) -> Result<ImageData<'a>> {
    let name = image.name();
    let external = |offset: usize| -> Result<ImageData<'a>> {
        let size = image.prop_u32("data-size").ok_or(VbeError::ImageNotFound)?;
        Ok(ImageData {
            name,
            offset,
            size: size as usize,
            external: true,
        })
    };

    if let Some(pos) = image.prop_u32("data-position") {
        return external(pos as usize);
    }
    if let Some(off) = image.prop_u32("data-offset") {
        let base = (fit.totalsize() + 3) & !3;
        return external(base + off as usize);
    }

    let data = image.property("data").ok_or(VbeError::ImageNotFound)?;
    Ok(ImageData {
        name,
        offset: data.offset,
        size: data.value.len(),
        external: false,
    })
}

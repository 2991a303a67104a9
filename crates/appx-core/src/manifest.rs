//! Package and bundle manifests

use crate::config::BundleConfig;
use crate::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Manifest every package carries at its root
pub const PACKAGE_MANIFEST: &str = "AppxManifest.xml";

/// Manifest written as the first entry of a bundle
pub const BUNDLE_MANIFEST: &str = "AppxBundleManifest.xml";

const BUNDLE_NAMESPACE: &str = "http://schemas.microsoft.com/appx/2013/bundle";
const BUNDLE_NAMESPACE_B4: &str = "http://schemas.microsoft.com/appx/2018/bundle";
const BUNDLE_SCHEMA_VERSION: &str = "4.0.0.0";

/// Check that `path` is a package manifest with a `Package` root
pub fn validate_package_manifest(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Validation(format!(
            "{} not found in input directory",
            PACKAGE_MANIFEST
        )));
    }

    let contents = fs::read_to_string(path)?;
    validate_manifest_text(&contents)?;
    debug!("Validated {:?}", path);
    Ok(())
}

/// Check that `contents` is well-formed up to a `Package` element
pub fn validate_manifest_text(contents: &str) -> Result<()> {
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Package" {
                    return Ok(());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Validation(format!(
                    "Malformed {}: {}",
                    PACKAGE_MANIFEST, e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Err(Error::Validation(format!(
        "{} has no Package element",
        PACKAGE_MANIFEST
    )))
}

/// Identity written into a bundle manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleIdentity {
    pub name: String,
    pub publisher: String,
    pub version: String,
    /// Architecture recorded for every contained package
    pub architecture: String,
}

impl Default for BundleIdentity {
    fn default() -> Self {
        Self::from(&BundleConfig::default())
    }
}

impl From<&BundleConfig> for BundleIdentity {
    fn from(config: &BundleConfig) -> Self {
        Self {
            name: config.name.clone(),
            publisher: config.publisher.clone(),
            version: config.version.clone(),
            architecture: config.architecture.clone(),
        }
    }
}

/// Render an AppxBundleManifest.xml listing `packages` (file names) in order
pub fn generate_bundle_manifest(identity: &BundleIdentity, packages: &[String]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut writer = Writer::new_with_indent(&mut output, b' ', 4);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut bundle = BytesStart::new("Bundle");
    bundle.push_attribute(("xmlns", BUNDLE_NAMESPACE));
    bundle.push_attribute(("xmlns:b4", BUNDLE_NAMESPACE_B4));
    bundle.push_attribute(("SchemaVersion", BUNDLE_SCHEMA_VERSION));
    writer.write_event(Event::Start(bundle))?;

    let mut bundle_identity = BytesStart::new("Identity");
    bundle_identity.push_attribute(("Name", identity.name.as_str()));
    bundle_identity.push_attribute(("Publisher", identity.publisher.as_str()));
    bundle_identity.push_attribute(("Version", identity.version.as_str()));
    writer.write_event(Event::Empty(bundle_identity))?;

    writer.write_event(Event::Start(BytesStart::new("Packages")))?;
    for file_name in packages {
        write_package_element(&mut writer, identity, file_name)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Packages")))?;

    writer.write_event(Event::End(BytesEnd::new("Bundle")))?;

    output.push(b'\n');
    Ok(output)
}

fn write_package_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    identity: &BundleIdentity,
    file_name: &str,
) -> Result<()> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let mut package = BytesStart::new("Package");
    package.push_attribute(("Type", "application"));
    package.push_attribute(("Version", identity.version.as_str()));
    package.push_attribute(("Architecture", identity.architecture.as_str()));
    writer.write_event(Event::Start(package))?;

    let mut package_identity = BytesStart::new("Identity");
    package_identity.push_attribute(("Name", format!("Package_{}", stem).as_str()));
    package_identity.push_attribute(("Publisher", identity.publisher.as_str()));
    package_identity.push_attribute(("Version", identity.version.as_str()));
    writer.write_event(Event::Empty(package_identity))?;

    writer.write_event(Event::Start(BytesStart::new("Resources")))?;
    let mut resource = BytesStart::new("Resource");
    resource.push_attribute(("Language", "en-US"));
    writer.write_event(Event::Empty(resource))?;
    writer.write_event(Event::End(BytesEnd::new("Resources")))?;

    let mut file = BytesStart::new("File");
    file.push_attribute(("Name", file_name));
    writer.write_event(Event::Empty(file))?;

    writer.write_event(Event::End(BytesEnd::new("Package")))?;
    Ok(())
}

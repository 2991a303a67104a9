//! Common test fixtures for appx testing

use crate::helpers::letters;
use crate::TestDir;
use anyhow::Result;
use std::path::PathBuf;

/// Minimal package manifest accepted by manifest validation
pub const SAMPLE_MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10">
  <Identity Name="Contoso.Sample" Publisher="CN=Contoso" Version="1.0.0.0"/>
  <Properties>
    <DisplayName>Sample</DisplayName>
  </Properties>
</Package>
"#;

/// Source content group map with one group of each kind, out of order
pub const SAMPLE_SOURCE_CGM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ContentGroupMap xmlns="http://schemas.microsoft.com/appx/2016/sourcecontentgroupmap">
  <Required>
    <Files>
      <File Name="App.exe"/>
      <File Name="AppxManifest.xml"/>
    </Files>
  </Required>
  <Optional Name="Levels">
    <Files>
      <File Name="levels/*.dat"/>
    </Files>
  </Optional>
  <Automatic>
    <Files>
      <File Name="Assets/*"/>
    </Files>
  </Automatic>
</ContentGroupMap>
"#;

/// Lays out a small application directory under `root`
///
/// Creates AppxManifest.xml, an executable, nested assets and one larger
/// file spanning several 8 KiB buffers.
pub fn create_package_layout(test_dir: &TestDir, root: &str) -> Result<PathBuf> {
    let root_path = test_dir.create_dir(root)?;

    test_dir.create_file(&format!("{root}/AppxManifest.xml"), SAMPLE_MANIFEST.as_bytes())?;
    test_dir.create_file(&format!("{root}/App.exe"), b"MZ\x90\x00 sample executable")?;
    test_dir.create_file(&format!("{root}/Assets/Logo.png"), &[0x89, b'P', b'N', b'G', 0, 1, 2])?;
    test_dir.create_file(&format!("{root}/Assets/Icons/small.png"), &[0x89, b'P', b'N', b'G'])?;
    test_dir.create_file(&format!("{root}/resources.pri"), &letters(40_000))?;
    test_dir.create_file(&format!("{root}/empty.txt"), b"")?;

    Ok(root_path)
}

/// Writes a 32-byte key file and returns its path
pub fn create_key_file(test_dir: &TestDir, name: &str) -> Result<PathBuf> {
    let key: Vec<u8> = (0u8..32).map(|b| b.wrapping_mul(7).wrapping_add(3)).collect();
    test_dir.create_file(name, &key)
}

/// Writes a source content group map and returns its path
pub fn create_source_cgm(test_dir: &TestDir, name: &str) -> Result<PathBuf> {
    test_dir.create_file(name, SAMPLE_SOURCE_CGM.as_bytes())
}

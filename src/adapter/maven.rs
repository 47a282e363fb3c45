use std::fs;
use std::path::Path;

use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::adapter::EcosystemAdapter;
use crate::models::Ecosystem;

/// Adapter for Maven and Gradle projects.
///
/// Packages are identified by `group:artifact` coordinates, matching how
/// threat feeds list JVM packages. Parses `pom.xml`,
/// `build.gradle` / `build.gradle.kts` and `gradle.lockfile`.
pub struct MavenAdapter;

impl EcosystemAdapter for MavenAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn get_manifest_files(&self) -> &'static [&'static str] {
        &["pom.xml", "build.gradle", "build.gradle.kts"]
    }

    fn get_lockfile_names(&self) -> &'static [&'static str] {
        &["gradle.lockfile"]
    }

    fn extract_dependencies(&self, file: &Path) -> Result<Vec<(String, String)>> {
        match file.file_name().and_then(|name| name.to_str()) {
            Some("pom.xml") => parse_pom_xml(file),
            Some("build.gradle") | Some("build.gradle.kts") => parse_build_gradle(file),
            Some("gradle.lockfile") => parse_gradle_lockfile(file),
            _ => Ok(Vec::new()),
        }
    }
}

/// `group:artifact`, or just the artifact when the group is absent.
fn coordinate(group_id: &str, artifact_id: &str) -> String {
    if group_id.is_empty() {
        artifact_id.to_string()
    } else {
        format!("{}:{}", group_id, artifact_id)
    }
}

/// Parse `pom.xml` with the quick-xml event API.
///
/// Every `<dependency>` element is collected, including the ones under
/// `<dependencyManagement>`, since pinned versions there are exactly what a
/// compromised-version check cares about. `<exclusions>` blocks carry their
/// own groupId/artifactId and must not overwrite the dependency's.
fn parse_pom_xml(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    let mut deps = Vec::new();
    let mut buf = Vec::new();

    let mut in_dependency = false;
    let mut in_exclusions = false;
    let mut current_tag = String::new();
    let mut group_id = String::new();
    let mut artifact_id = String::new();
    let mut version = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                current_tag = name.clone();

                match name.as_str() {
                    "dependency" if !in_exclusions => {
                        in_dependency = true;
                        group_id.clear();
                        artifact_id.clear();
                        version.clear();
                    }
                    "exclusions" if in_dependency => in_exclusions = true,
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();

                match name.as_str() {
                    "exclusions" => in_exclusions = false,
                    "dependency" if in_dependency && !in_exclusions => {
                        if !artifact_id.is_empty() {
                            deps.push((coordinate(&group_id, &artifact_id), version.clone()));
                        }
                        in_dependency = false;
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Text(ref e)) => {
                if in_dependency && !in_exclusions {
                    let text = e.unescape().unwrap_or_default();
                    match current_tag.as_str() {
                        "groupId" => group_id = text.to_string(),
                        "artifactId" => artifact_id = text.to_string(),
                        "version" => version = text.to_string(),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(deps)
}

/// Parse `build.gradle` or `build.gradle.kts` with regex.
fn parse_build_gradle(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let mut deps = Vec::new();

    // Matches: implementation 'group:artifact:version'
    //          implementation("group:artifact:version")
    let re_shorthand = Regex::new(
        r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation)\s*\(?\s*['"]([^'":]+):([^'":]+):([^'"]+)['"]"#,
    )?;
    for caps in re_shorthand.captures_iter(&content) {
        deps.push((coordinate(&caps[1], &caps[2]), caps[3].to_string()));
    }

    // Matches: implementation group: 'com.example', name: 'foo', version: '1.0'
    let re_map = Regex::new(
        r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation)\s+group:\s*['"]([^'"]+)['"]\s*,\s*name:\s*['"]([^'"]+)['"]\s*,\s*version:\s*['"]([^'"]+)['"]"#,
    )?;
    for caps in re_map.captures_iter(&content) {
        deps.push((coordinate(&caps[1], &caps[2]), caps[3].to_string()));
    }

    Ok(deps)
}

/// Parse `gradle.lockfile` lines of the form `group:artifact:version=...`.
fn parse_gradle_lockfile(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let re = Regex::new(r"^([^:=\s]+):([^:=\s]+):([^=\s]+)")?;

    let mut deps = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("empty=") {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            deps.push((coordinate(&caps[1], &caps[2]), caps[3].to_string()));
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProgressSpinner;
    use crate::threat::database::ThreatDatabase;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_parse_pom_xml() {
        let xml = r#"<?xml version="1.0"?>
<project>
  <dependencies>
    <dependency>
      <groupId>org.apache.logging.log4j</groupId>
      <artifactId>log4j-core</artifactId>
      <version>2.14.1</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
    </dependency>
  </dependencies>
</project>"#;

        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", xml).unwrap();
        let deps = parse_pom_xml(f.path()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].0, "org.apache.logging.log4j:log4j-core");
        assert_eq!(deps[0].1, "2.14.1");
    }

    #[test]
    fn test_parse_pom_exclusions_do_not_clobber_coordinates() {
        let xml = r#"<project>
  <dependencies>
    <dependency>
      <groupId>com.example</groupId>
      <artifactId>widget</artifactId>
      <version>1.0.0</version>
      <exclusions>
        <exclusion>
          <groupId>org.unwanted</groupId>
          <artifactId>noise</artifactId>
        </exclusion>
      </exclusions>
    </dependency>
  </dependencies>
</project>"#;

        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", xml).unwrap();
        let deps = parse_pom_xml(f.path()).unwrap();
        assert_eq!(deps, vec![("com.example:widget".to_string(), "1.0.0".to_string())]);
    }

    #[test]
    fn test_parse_pom_dependency_without_version() {
        let xml = r#"<project>
  <dependencies>
    <dependency>
      <groupId>com.example</groupId>
      <artifactId>managed</artifactId>
    </dependency>
  </dependencies>
</project>"#;

        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", xml).unwrap();
        let deps = parse_pom_xml(f.path()).unwrap();
        assert_eq!(deps, vec![("com.example:managed".to_string(), String::new())]);
    }

    #[test]
    fn test_parse_build_gradle() {
        let content = r#"
dependencies {
    implementation 'org.springframework:spring-core:5.3.23'
    implementation "com.google.guava:guava:31.1-jre"
    testImplementation 'junit:junit:4.13.2'
}
"#;
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        let deps = parse_build_gradle(f.path()).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].0, "org.springframework:spring-core");
    }

    #[test]
    fn test_parse_build_gradle_kts_call_style() {
        let content = r#"
dependencies {
    implementation("org.apache.logging.log4j:log4j-core:2.14.1")
    api("com.squareup.okhttp3:okhttp:4.9.0")
}
"#;
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        let deps = parse_build_gradle(f.path()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(
            deps[0],
            (
                "org.apache.logging.log4j:log4j-core".to_string(),
                "2.14.1".to_string()
            )
        );
    }

    #[test]
    fn test_parse_build_gradle_map_style() {
        let content =
            "implementation group: 'com.example', name: 'widget', version: '1.0.0'\n";
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        let deps = parse_build_gradle(f.path()).unwrap();
        assert_eq!(deps, vec![("com.example:widget".to_string(), "1.0.0".to_string())]);
    }

    #[test]
    fn test_parse_gradle_lockfile() {
        let content = "# This is a Gradle generated file for dependency locking.\n\
                       com.example:widget:1.0.0=compileClasspath,runtimeClasspath\n\
                       org.apache.logging.log4j:log4j-core:2.14.1=runtimeClasspath\n\
                       empty=annotationProcessor\n";
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        let deps = parse_gradle_lockfile(f.path()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(
            deps[1],
            (
                "org.apache.logging.log4j:log4j-core".to_string(),
                "2.14.1".to_string()
            )
        );
    }

    #[test]
    fn test_scan_matches_maven_coordinates() {
        let feeds = TempDir::new().unwrap();
        let feed = feeds.path().join("log4shell.csv");
        std::fs::write(
            &feed,
            "ecosystem,name,version\nmaven,org.apache.logging.log4j:log4j-core,2.14.1\n",
        )
        .unwrap();
        let mut db = ThreatDatabase::new(feeds.path());
        db.load_threats(None, Some(&feed)).unwrap();

        let project = TempDir::new().unwrap();
        std::fs::write(
            project.path().join("pom.xml"),
            r#"<project>
  <dependencies>
    <dependency>
      <groupId>org.apache.logging.log4j</groupId>
      <artifactId>log4j-core</artifactId>
      <version>2.14.1</version>
    </dependency>
  </dependencies>
</project>"#,
        )
        .unwrap();

        let findings =
            MavenAdapter.scan_all_projects(&db, project.path(), &ProgressSpinner::disabled());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].ecosystem, Ecosystem::Maven);
        assert_eq!(findings[0].package, "org.apache.logging.log4j:log4j-core");
        assert_eq!(findings[0].threat, "log4shell");
        assert!(findings[0].file.ends_with("pom.xml"));
    }

    #[test]
    fn test_gradle_lockfile_shadows_build_gradle() {
        let feeds = TempDir::new().unwrap();
        let feed = feeds.path().join("feed.csv");
        std::fs::write(
            &feed,
            "ecosystem,name,version\nmaven,com.example:widget,1.0.0\n",
        )
        .unwrap();
        let mut db = ThreatDatabase::new(feeds.path());
        db.load_threats(None, Some(&feed)).unwrap();

        let project = TempDir::new().unwrap();
        std::fs::write(
            project.path().join("build.gradle"),
            "implementation 'com.example:widget:1.0.0'\n",
        )
        .unwrap();
        std::fs::write(
            project.path().join("gradle.lockfile"),
            "com.example:widget:1.0.0=runtimeClasspath\n",
        )
        .unwrap();

        let findings =
            MavenAdapter.scan_all_projects(&db, project.path(), &ProgressSpinner::disabled());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].file.ends_with("gradle.lockfile"));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Scan sessions.

A [Scanner] binds a loaded [RuleRegistry] to scan options and runs
extraction plus evaluation over artifacts. Failures scanning an individual
artifact never abort a batch: they are reported as an
[UNSCANNABLE_ARTIFACT] finding instead.
*/

use {
    crate::{
        artifact::{Artifact, ArtifactKind},
        dependency::DependencyList,
        error::Result,
        evaluate::evaluate,
        extract::{extract, ExtractOptions},
        facts::FactSet,
        finding::{sort_findings, Evidence, Finding, Severity},
        rules::RuleRegistry,
    },
    log::{info, warn},
    rayon::prelude::*,
    serde::Serialize,
    sha2::{Digest, Sha256},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    },
};

/// Rule id and tag of findings for artifacts that could not be scanned.
pub const UNSCANNABLE_ARTIFACT: &str = "unscannable-artifact";

/// Options for a scan session.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    pub extract: ExtractOptions,
    /// Reuse extracted facts for artifacts with identical content.
    pub cache_facts: bool,
    /// Kind to assume for artifacts read from paths. Detected if `None`.
    pub declared_kind: Option<ArtifactKind>,
    /// Package relationships attached to artifacts read from paths.
    pub depends: Option<DependencyList>,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct CacheKey {
    path: PathBuf,
    sha256: String,
    kind: ArtifactKind,
    min_string_length: usize,
    depends: Option<String>,
}

impl CacheKey {
    fn new(artifact: &Artifact, options: &ExtractOptions) -> Self {
        Self {
            path: artifact.path().to_path_buf(),
            sha256: hex::encode(Sha256::digest(artifact.content())),
            kind: artifact.kind(),
            min_string_length: options.min_string_length,
            depends: artifact.depends().map(|d| d.to_string()),
        }
    }
}

/// Extracted facts keyed by artifact identity and content digest.
#[derive(Debug, Default)]
pub struct FactCache {
    entries: Mutex<HashMap<CacheKey, Arc<FactSet>>>,
}

impl FactCache {
    /// Obtain facts for an artifact, extracting them on a cache miss.
    ///
    /// Extraction failures are not cached.
    pub fn get_or_extract(
        &self,
        artifact: &Artifact,
        options: &ExtractOptions,
    ) -> Result<Arc<FactSet>> {
        let key = CacheKey::new(artifact, options);

        if let Some(facts) = self.entries.lock().unwrap().get(&key) {
            return Ok(facts.clone());
        }

        // Extraction happens without holding the lock.
        let facts = Arc::new(extract(artifact, options)?);
        self.entries.lock().unwrap().insert(key, facts.clone());

        Ok(facts)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Results of scanning a batch of artifacts.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanReport {
    /// Number of artifacts examined, including unscannable ones.
    pub artifacts: usize,
    /// Number of artifacts that could not be scanned.
    pub unscannable: usize,
    /// All findings, in report order.
    pub findings: Vec<Finding>,
}

impl ScanReport {
    /// The most severe finding severity, if there are any findings.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Number of findings per severity.
    pub fn severity_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_default() += 1;
        }

        counts
    }
}

/// Scans artifacts against a rule registry.
pub struct Scanner<'a> {
    registry: &'a RuleRegistry,
    options: ScanOptions,
    cache: Option<FactCache>,
}

impl<'a> Scanner<'a> {
    pub fn new(registry: &'a RuleRegistry, options: ScanOptions) -> Self {
        let cache = if options.cache_facts {
            Some(FactCache::default())
        } else {
            None
        };

        Self {
            registry,
            options,
            cache,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        self.registry
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// The fact cache, if caching is enabled.
    pub fn cache(&self) -> Option<&FactCache> {
        self.cache.as_ref()
    }

    /// Read an artifact from a path, applying the session's declared kind and
    /// package relationships.
    pub fn load_artifact(&self, path: &Path) -> Result<Artifact> {
        let artifact = Artifact::from_path(path, self.options.declared_kind)?;

        Ok(match &self.options.depends {
            Some(depends) => artifact.with_depends(depends.clone()),
            None => artifact,
        })
    }

    /// Extract facts for an artifact, consulting the cache if enabled.
    pub fn facts(&self, artifact: &Artifact) -> Result<Arc<FactSet>> {
        match &self.cache {
            Some(cache) => cache.get_or_extract(artifact, &self.options.extract),
            None => Ok(Arc::new(extract(artifact, &self.options.extract)?)),
        }
    }

    /// Scan an artifact, returning findings in report order.
    ///
    /// Extraction failures produce a single [UNSCANNABLE_ARTIFACT] finding.
    pub fn scan(&self, artifact: &Artifact) -> Vec<Finding> {
        match self.facts(artifact) {
            Ok(facts) => evaluate(&facts, self.registry),
            Err(e) => vec![unscannable(artifact.path(), &e.to_string())],
        }
    }

    /// Read and scan an artifact from a path.
    ///
    /// The artifact content is released before this returns.
    pub fn scan_path(&self, path: &Path) -> Vec<Finding> {
        match self.load_artifact(path) {
            Ok(artifact) => self.scan(&artifact),
            Err(e) => vec![unscannable(path, &e.to_string())],
        }
    }

    /// Scan many paths in parallel.
    ///
    /// The report is identical to scanning the paths sequentially.
    pub fn scan_paths(&self, paths: &[PathBuf]) -> ScanReport {
        let results = paths
            .par_iter()
            .map(|path| self.scan_path(path))
            .collect::<Vec<_>>();

        let mut report = ScanReport {
            artifacts: paths.len(),
            ..Default::default()
        };

        for findings in results {
            if findings.iter().any(|f| f.rule_id == UNSCANNABLE_ARTIFACT) {
                report.unscannable += 1;
            }
            report.findings.extend(findings);
        }

        sort_findings(&mut report.findings);

        info!(
            "scanned {} artifacts ({} unscannable); {} findings",
            report.artifacts,
            report.unscannable,
            report.findings.len()
        );

        report
    }
}

fn unscannable(path: &Path, message: &str) -> Finding {
    warn!("unable to scan {}: {}", path.display(), message);

    Finding {
        rule_id: UNSCANNABLE_ARTIFACT.to_string(),
        tag: UNSCANNABLE_ARTIFACT.to_string(),
        severity: Severity::Error,
        artifact: path.to_path_buf(),
        evidence: Evidence::Failure {
            message: message.to_string(),
        },
        explanation: format!("{} could not be scanned: {}", path.display(), message),
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{error::ScanError, testutil::ElfBuilder},
    };

    fn write(path: &Path, data: &[u8]) -> Result<()> {
        std::fs::write(path, data).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn tempdir() -> Result<tempfile::TempDir> {
        tempfile::tempdir().map_err(|source| ScanError::Io {
            path: std::env::temp_dir(),
            source,
        })
    }

    #[test]
    fn batch_continues_past_failures() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let td = tempdir()?;

        let good = td.path().join("zlib");
        write(
            &good,
            &ElfBuilder::new64()
                .string("deflate 1.2.3.3 Copyright 1995-2006 Jean-loup Gailly")
                .build(),
        )?;

        let truncated = td.path().join("truncated");
        write(&truncated, &ElfBuilder::new64().build()[0..40])?;

        let missing = td.path().join("missing");

        let scanner = Scanner::new(
            &registry,
            ScanOptions {
                declared_kind: Some(ArtifactKind::Binary),
                ..Default::default()
            },
        );
        let report = scanner.scan_paths(&[good.clone(), truncated.clone(), missing.clone()]);

        assert_eq!(report.artifacts, 3);
        assert_eq!(report.unscannable, 2);
        assert_eq!(report.max_severity(), Some(Severity::Error));
        assert_eq!(
            report
                .findings
                .iter()
                .map(|f| (f.tag.as_str(), f.artifact.as_path()))
                .collect::<Vec<_>>(),
            vec![
                ("embedded-zlib", good.as_path()),
                (UNSCANNABLE_ARTIFACT, missing.as_path()),
                (UNSCANNABLE_ARTIFACT, truncated.as_path()),
            ]
        );
        assert_eq!(report.severity_counts().get(&Severity::Error), Some(&3));

        Ok(())
    }

    #[test]
    fn corrupt_elf_is_unscannable_when_detected() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let td = tempdir()?;

        let short = td.path().join("short");
        write(&short, b"\x7fELF\x02\x01\x01")?;

        let mut header = ElfBuilder::new64().build()[0..64].to_vec();
        header[4] = 0;
        let bad_class = td.path().join("badclass");
        write(&bad_class, &header)?;

        let truncated = td.path().join("libtruncated.so.1");
        write(&truncated, &ElfBuilder::new32().shared_object().build()[0..30])?;

        let scanner = Scanner::new(&registry, ScanOptions::default());
        let report = scanner.scan_paths(&[short.clone(), bad_class.clone(), truncated.clone()]);

        assert_eq!(report.unscannable, 3);
        assert_eq!(
            report
                .findings
                .iter()
                .map(|f| (f.rule_id.as_str(), f.artifact.as_path()))
                .collect::<Vec<_>>(),
            vec![
                (UNSCANNABLE_ARTIFACT, bad_class.as_path()),
                (UNSCANNABLE_ARTIFACT, truncated.as_path()),
                (UNSCANNABLE_ARTIFACT, short.as_path()),
            ]
        );

        Ok(())
    }

    #[test]
    fn parallel_matches_sequential() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let td = tempdir()?;

        let mut paths = vec![];
        for (i, literal) in [
            "DR. B. STRUCK",
            "GNU MP: Cannot allocate memory",
            "teh end",
            "nothing to see",
        ]
        .iter()
        .enumerate()
        {
            let path = td.path().join(format!("bin{}", i));
            write(&path, &ElfBuilder::new32().string(literal).import("open").build())?;
            paths.push(path);
        }

        let scanner = Scanner::new(&registry, ScanOptions::default());
        let report = scanner.scan_paths(&paths);

        let mut sequential = paths
            .iter()
            .flat_map(|p| scanner.scan_path(p))
            .collect::<Vec<_>>();
        sort_findings(&mut sequential);

        assert_eq!(report.findings, sequential);
        assert_eq!(report.unscannable, 0);
        // 4 missing-lfs plus 3 content findings.
        assert_eq!(report.findings.len(), 7);

        Ok(())
    }

    #[test]
    fn detects_kind() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let td = tempdir()?;

        let source = td.path().join("open.c");
        write(&source, b"int f(const char *p) { return open(p, O_RDONLY); }\n")?;

        let lib = td.path().join("libfoo.so");
        write(
            &lib,
            &ElfBuilder::new64().shared_object().soname("libfoo.so").build(),
        )?;

        let scanner = Scanner::new(&registry, ScanOptions::default());
        let report = scanner.scan_paths(&[source.clone(), lib.clone()]);

        assert_eq!(
            report
                .findings
                .iter()
                .map(|f| f.tag.as_str())
                .collect::<Vec<_>>(),
            vec!["unversioned-shlib", "missing-lfs"]
        );

        Ok(())
    }

    #[test]
    fn cache() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let scanner = Scanner::new(
            &registry,
            ScanOptions {
                cache_facts: true,
                ..Default::default()
            },
        );
        let cache = scanner.cache().unwrap();

        let artifact = Artifact::new(
            "usr/bin/foo",
            ElfBuilder::new64().import("fcrypt").build(),
            ArtifactKind::Binary,
        );

        let a = scanner.facts(&artifact)?;
        let b = scanner.facts(&artifact)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        // Different content is a different entry.
        let other = Artifact::new(
            "usr/bin/foo",
            ElfBuilder::new64().import("setkey").build(),
            ArtifactKind::Binary,
        );
        assert_eq!(scanner.scan(&other)[0].tag, "obsolete-des-setkey");
        assert_eq!(cache.len(), 2);

        // Failures are not cached.
        let broken = Artifact::new("usr/bin/bar", b"junk".to_vec(), ArtifactKind::Binary);
        let findings = scanner.scan(&broken);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, UNSCANNABLE_ARTIFACT);
        assert!(matches!(findings[0].evidence, Evidence::Failure { .. }));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());

        let scanner = Scanner::new(&registry, ScanOptions::default());
        assert!(scanner.cache().is_none());

        Ok(())
    }

    #[test]
    fn depends_apply_to_paths() -> Result<()> {
        let registry = RuleRegistry::builtin()?;
        let td = tempdir()?;

        let path = td.path().join("basic.c");
        write(
            &path,
            b"void * do_import_array(void)\n{\n    import_array();\n    return NULL;\n}\n",
        )?;

        let scanner = Scanner::new(&registry, ScanOptions::default());
        assert_eq!(
            scanner.scan_path(&path)[0].tag,
            "missing-depends-on-numpy-abi"
        );

        let scanner = Scanner::new(
            &registry,
            ScanOptions {
                depends: Some(DependencyList::parse("python3-numpy-abi9 | python3-numpy")?),
                ..Default::default()
            },
        );
        assert!(scanner.scan_path(&path).is_empty());

        Ok(())
    }
}

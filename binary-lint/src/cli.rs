// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{anyhow, Context, Result},
    binary_signature_scanner::{
        artifact::ArtifactKind,
        dependency::DependencyList,
        extract::ExtractOptions,
        finding::Severity,
        packages::PackageIndex,
        rules::RuleRegistry,
        scan::{ScanOptions, ScanReport, Scanner},
    },
    clap::{Arg, ArgMatches, Command},
    log::LevelFilter,
    std::{io::Write, path::PathBuf, str::FromStr},
};

const ABOUT: &str = "\
# About

`blint` scans Linux binaries, shared libraries and source files for
packaging problems.

Each file is reduced to a set of facts (printable strings, dynamic symbol
references and structural properties like missing large file support).
Declarative rules are then evaluated against those facts. Each matching
rule produces a finding with a tag, a severity and the evidence that caused
it to match.

By default a built-in set of rules is used. Use `--rules` to load rules from
a YAML file instead.
";

const SCAN_ABOUT: &str = "\
Scan files for packaging problems.

Every path is scanned independently and in parallel. Files that cannot be
read or parsed are reported with an `unscannable-artifact` finding and do
not prevent other files from being scanned.

The kind of each file is detected from its content unless `--kind` is
given. ELF files of type ET_DYN named like `*.so*` are shared libraries,
other ELF files are binaries and everything else is scanned as text.
";

const CHECK_DEPENDS_ABOUT: &str = "\
Check package relationships in a package index for satisfiability.

The index is a file in the format of a Debian `Packages` file. Every
`Pre-Depends`, `Depends` and `Recommends` relationship of every package in
the index is resolved against the packages of the index itself. Names listed
in `Provides` are available as virtual packages, which satisfy unversioned
relationships only.

Relationships that cannot be satisfied are printed and cause a non-zero
exit.
";

const FORMATS: [&str; 2] = ["text", "json"];
const KINDS: [&str; 4] = ["auto", "binary", "shared-library", "source-text"];
const SEVERITIES: [&str; 6] = [
    "never",
    "classification",
    "pedantic",
    "info",
    "warning",
    "error",
];

fn command(default_threads: &str) -> Command<'_> {
    let app = Command::new("Binary Lint")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Scan Linux binaries and sources for packaging problems")
        .long_about(ABOUT)
        .arg_required_else_help(true);

    let app = app.arg(
        Arg::new("rules")
            .long("rules")
            .takes_value(true)
            .global(true)
            .help("Path to YAML file defining rules (defaults to built-in rules)"),
    );

    let app = app.arg(
        Arg::new("min_length")
            .long("min-length")
            .takes_value(true)
            .default_value("4")
            .global(true)
            .help("Minimum length of extracted strings"),
    );

    let app = app.arg(
        Arg::new("threads")
            .short('t')
            .long("threads")
            .takes_value(true)
            .default_value(default_threads)
            .global(true)
            .help("Number of threads to use"),
    );

    let app = app.arg(
        Arg::new("format")
            .long("format")
            .takes_value(true)
            .possible_values(FORMATS)
            .default_value("text")
            .global(true)
            .help("Output format"),
    );

    let app = app.arg(
        Arg::new("kind")
            .long("kind")
            .takes_value(true)
            .possible_values(KINDS)
            .default_value("auto")
            .global(true)
            .help("Kind of artifact to treat files as"),
    );

    let app = app.arg(
        Arg::new("depends")
            .long("depends")
            .takes_value(true)
            .global(true)
            .help("Depends field of the package shipping the files"),
    );

    let app = app.arg(
        Arg::new("cache")
            .long("cache")
            .global(true)
            .help("Reuse extracted facts for files with identical content"),
    );

    let app = app.arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .multiple_occurrences(true)
            .help("Increase logging verbosity. Can be specified multiple times."),
    );

    let app = app.subcommand(
        Command::new("scan")
            .about("Scan files for packaging problems")
            .long_about(SCAN_ABOUT)
            .arg(
                Arg::new("fail_on")
                    .long("fail-on")
                    .takes_value(true)
                    .possible_values(SEVERITIES)
                    .default_value("error")
                    .help("Exit with an error if a finding of this severity or higher is found"),
            )
            .arg(
                Arg::new("path")
                    .takes_value(true)
                    .multiple_values(true)
                    .required(true)
                    .help("Files to scan"),
            ),
    );

    let app = app.subcommand(Command::new("rules").about("Print the rules that would be applied"));

    let app = app.subcommand(
        Command::new("check-depends")
            .about("Check package relationships in a package index")
            .long_about(CHECK_DEPENDS_ABOUT)
            .arg(
                Arg::new("index")
                    .takes_value(true)
                    .required(true)
                    .help("Packages file to check"),
            ),
    );

    app.subcommand(
        Command::new("facts")
            .about("Print the facts extracted from a file")
            .arg(
                Arg::new("path")
                    .takes_value(true)
                    .required(true)
                    .help("File to extract facts from"),
            ),
    )
}

pub fn run() -> Result<()> {
    let default_threads = format!("{}", num_cpus::get());
    let matches = command(&default_threads).get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    let (command, args) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("invalid sub-command"))?;

    let threads = args.value_of_t::<usize>("threads")?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("configuring thread pool")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        "scan" => command_scan(args, &mut out),
        "rules" => command_rules(args, &mut out),
        "facts" => command_facts(args, &mut out),
        "check-depends" => command_check_depends(args, &mut out),
        _ => Err(anyhow!("unhandled sub-command: {}", command)),
    }
}

fn load_registry(args: &ArgMatches) -> Result<RuleRegistry> {
    Ok(match args.value_of("rules") {
        Some(path) => RuleRegistry::from_path(path)?,
        None => RuleRegistry::builtin()?,
    })
}

fn scan_options(args: &ArgMatches) -> Result<ScanOptions> {
    let declared_kind = match args.value_of("kind") {
        None | Some("auto") => None,
        Some(kind) => Some(ArtifactKind::from_str(kind)?),
    };

    let depends = args
        .value_of("depends")
        .map(DependencyList::parse)
        .transpose()?;

    Ok(ScanOptions {
        extract: ExtractOptions {
            min_string_length: args.value_of_t::<usize>("min_length")?,
        },
        cache_facts: args.is_present("cache"),
        declared_kind,
        depends,
    })
}

fn is_json(args: &ArgMatches) -> bool {
    args.value_of("format") == Some("json")
}

fn write_report(report: &ScanReport, json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    for finding in &report.findings {
        writeln!(out, "{}", finding)?;
        log::info!("  {}", finding.explanation);
    }

    Ok(())
}

fn command_scan(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let registry = load_registry(args)?;
    let options = scan_options(args)?;

    let paths = args
        .values_of("path")
        .ok_or_else(|| anyhow!("path argument is required"))?
        .map(PathBuf::from)
        .collect::<Vec<_>>();

    let scanner = Scanner::new(&registry, options);
    let report = scanner.scan_paths(&paths);

    write_report(&report, is_json(args), out)?;

    let fail_on = args.value_of("fail_on").unwrap_or("error");
    if fail_on != "never" {
        let threshold = Severity::from_str(fail_on)?;

        let count = report
            .findings
            .iter()
            .filter(|f| f.severity >= threshold)
            .count();

        if count > 0 {
            return Err(anyhow!(
                "{} findings of severity {} or higher",
                count,
                threshold
            ));
        }
    }

    Ok(())
}

fn command_rules(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let registry = load_registry(args)?;

    if is_json(args) {
        let rules = registry
            .rules()
            .iter()
            .map(|rule| {
                serde_json::json!({
                    "id": rule.id(),
                    "tag": rule.tag(),
                    "severity": rule.severity(),
                    "matcher": rule.matcher().to_string(),
                    "explanation": rule.explanation(),
                })
            })
            .collect::<Vec<_>>();

        serde_json::to_writer_pretty(&mut *out, &rules)?;
        writeln!(out)?;
    } else {
        for rule in registry.rules() {
            writeln!(
                out,
                "{} {} ({}): {}",
                rule.severity().code(),
                rule.id(),
                rule.tag(),
                rule.matcher()
            )?;
        }
    }

    Ok(())
}

fn command_facts(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let registry = RuleRegistry::default();
    let scanner = Scanner::new(&registry, scan_options(args)?);

    let path = args
        .value_of("path")
        .ok_or_else(|| anyhow!("path argument is required"))?;

    let artifact = scanner.load_artifact(path.as_ref())?;
    let facts = scanner.facts(&artifact)?;

    if is_json(args) {
        serde_json::to_writer_pretty(&mut *out, facts.as_ref())?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "path: {}", facts.artifact().display())?;
    writeln!(out, "kind: {}", facts.kind())?;

    for (flag, detail) in facts.flags() {
        if detail.is_empty() {
            writeln!(out, "flag: {}", flag)?;
        } else {
            writeln!(out, "flag: {} ({})", flag, detail)?;
        }
    }

    for symbol in facts.referenced_symbols() {
        match &symbol.version {
            Some(version) => writeln!(out, "symbol: {}@{}", symbol.name, version)?,
            None => writeln!(out, "symbol: {}", symbol.name)?,
        }
    }

    for s in facts.strings() {
        writeln!(out, "string: {:#x} {}", s.offset, s.value)?;
    }

    Ok(())
}

fn command_check_depends(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let path = args
        .value_of("index")
        .ok_or_else(|| anyhow!("index argument is required"))?;

    let data =
        std::fs::read_to_string(path).with_context(|| format!("reading package index {}", path))?;
    let index = PackageIndex::parse(&data)?;
    log::info!("checking {} packages", index.packages().len());

    let unsatisfied = index.check();

    if is_json(args) {
        serde_json::to_writer_pretty(&mut *out, &unsatisfied)?;
        writeln!(out)?;
    } else {
        for entry in &unsatisfied {
            writeln!(out, "{}", entry)?;
        }
    }

    if unsatisfied.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} packages have unsatisfiable relationships",
            unsatisfied
                .iter()
                .map(|x| x.package.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .len()
        ))
    }
}

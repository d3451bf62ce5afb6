use anyhow::{bail, Context, Result};
use clap::{Arg, Command};
use log::LevelFilter;
use mail_sorter::maildir::{dry_run_from_env, Maildir};
use mail_sorter::report::{apply_suggestions, AnalysisReport, ReportFormat};
use mail_sorter::{
    thunderbird, ClassificationEngine, Config, Disposition, DomainAggregator, FolderAnalysis,
    MessageRecord, RuleSuggester, RunStats, StatEvent,
};
use std::path::Path;
use std::process;

const DEFAULT_CONFIG: &str = "mail-sorter.yaml";

fn build_cli() -> Command {
    Command::new("mail-sorter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sorts mailbox messages into folders by rules and suggests new rules")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (YAML, or JSON by extension)")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate rules, spam settings and categories")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Classify a single RFC 5322 message file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("DIR")
                .help("Classify a mailbox without moving anything and suggest rules")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("analyze-folders")
                .long("analyze-folders")
                .value_name("DIR")
                .help("Report duplicate, empty and single-child folders of a mailbox")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Report format for --analyze and --analyze-folders (text, markdown, json)")
                .default_value("text"),
        )
        .arg(
            Arg::new("sort")
                .long("sort")
                .value_name("DIR")
                .help("Sort a Maildir into rule and spam folders")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Only report what --sort would move (also DRY_RUN=true)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("apply-suggestions")
                .long("apply-suggestions")
                .value_name("FILE")
                .help("Merge suggested rules from a JSON report or rule list")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("import-thunderbird")
                .long("import-thunderbird")
                .value_name("FILE")
                .help("Convert a Thunderbird filter export into rules")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write --import-thunderbird rules to FILE instead of stdout")
                .action(clap::ArgAction::Set),
        )
}

fn main() {
    let mut cli = build_cli();
    let matches = cli.clone().get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let mut config = match Config::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let result = if let Some(email_file) = matches.get_one::<String>("test-email") {
        test_email_file(&config, email_file)
    } else if matches.get_flag("test-config") {
        test_config(&config)
    } else if let Some(dir) = matches.get_one::<String>("analyze") {
        let format = matches
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("text");
        format
            .parse::<ReportFormat>()
            .and_then(|format| analyze(&config, dir, format))
    } else if let Some(dir) = matches.get_one::<String>("analyze-folders") {
        matches
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("text")
            .parse::<ReportFormat>()
            .and_then(|format| analyze_folders(dir, format))
    } else if let Some(dir) = matches.get_one::<String>("sort") {
        let dry_run = matches.get_flag("dry-run") || dry_run_from_env();
        sort(&config, dir, dry_run)
    } else if let Some(file) = matches.get_one::<String>("apply-suggestions") {
        apply(&mut config, config_path, file)
    } else if let Some(file) = matches.get_one::<String>("import-thunderbird") {
        import_thunderbird(file, matches.get_one::<String>("output").map(String::as_str))
    } else {
        let _ = cli.print_help();
        println!();
        process::exit(2);
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {e:#}");
        process::exit(1);
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn build_engine(config: &Config) -> Result<ClassificationEngine> {
    let rules = config.rule_set()?;
    let spam = config.spam_config()?;
    Ok(ClassificationEngine::new(rules, &spam))
}

fn test_config(config: &Config) -> Result<()> {
    println!("🔍 Testing configuration...");
    println!();

    let rules = config.rule_set()?;
    let spam = config.spam_config()?;

    println!("Number of rules: {}", rules.len());
    for (i, rule) in rules.iter().enumerate() {
        println!("  Rule {}: {} → {}", i + 1, rule.name, rule.folder);
    }
    println!();
    let engine = ClassificationEngine::new(rules, &spam);
    let classifier = engine.classifier();
    if classifier.is_enabled() {
        println!(
            "Spam filter: enabled ({} blacklisted domains, {} keywords, {} patterns) → {}",
            spam.blacklist_domains.len(),
            spam.blacklist_keywords_subject.len(),
            spam.suspicious_subject_patterns.len(),
            spam.spam_folder
        );
        println!("  Checks: {}", classifier.check_names().join(" → "));
    } else {
        println!("Spam filter: disabled");
    }
    println!("Whitelisted domains: {}", engine.whitelist().len());
    println!("Categories: {}", config.categories.len());
    println!();

    let problems = config.validate()?;
    if problems.is_empty() {
        println!("✅ Configuration is valid");
        return Ok(());
    }

    println!("❌ Configuration validation failed:");
    for problem in &problems {
        println!("  • {problem}");
    }
    bail!("{} configuration problem(s)", problems.len())
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

fn test_email_file(config: &Config, email_file: &str) -> Result<()> {
    println!("🧪 Testing email file: {}", email_file);
    println!();

    let bytes = std::fs::read(email_file)
        .with_context(|| format!("Failed to read email file: {email_file}"))?;
    let message = MessageRecord::parse(&bytes);

    println!("📧 Email Details:");
    println!("   From: {}", message.sender);
    println!("   To: {}", truncate_string(message.to(), 100));
    println!("   Subject: {}", message.subject);
    println!(
        "   Domain: {}",
        message.sender_domain().as_deref().unwrap_or("unknown")
    );
    println!();

    let engine = build_engine(config)?;
    let result = engine.classify_message(&message);

    match result.disposition {
        Disposition::Spam => {
            println!("🗑️  Result: SPAM");
            if let Some(reason) = &result.spam_reason {
                println!("   Reason: {reason}");
            }
        }
        Disposition::RuleMatch => {
            println!("✅ Result: RULE MATCH");
            if let Some(name) = &result.matched_rule_name {
                println!("   Rule: {name}");
            }
        }
        Disposition::Unmatched => println!("❓ Result: UNMATCHED (stays in inbox)"),
    }
    if let Some(folder) = &result.target_folder {
        println!("   Target folder: {folder}");
    }
    Ok(())
}

fn read_mailbox(mailbox: &Maildir, stats: &mut RunStats) -> Result<Vec<MessageRecord>> {
    let mut messages = Vec::new();
    for entry in mailbox.list()? {
        match mailbox.read(&entry) {
            Ok(message) => messages.push(message),
            Err(e) => {
                log::error!("{e:#}");
                stats.record_event(StatEvent::Error);
            }
        }
    }
    Ok(messages)
}

fn analyze(config: &Config, dir: &str, format: ReportFormat) -> Result<()> {
    let mailbox = Maildir::open(dir)?;
    let mut stats = RunStats::new();
    let messages = read_mailbox(&mailbox, &mut stats)?;
    log::info!("Read {} messages from {}", messages.len(), dir);

    let rules = config.rule_set()?;
    let spam = config.spam_config()?;
    let engine = ClassificationEngine::new(rules.clone(), &spam);
    let aggregator = DomainAggregator::new(config.suggestions.example_limit);
    let suggester = RuleSuggester::new(&config.categories, &rules, &config.suggestions);

    let report = AnalysisReport::analyze(&messages, &engine, &aggregator, &suggester);
    print!("{}", report.render(format)?);

    if stats.errors > 0 {
        log::warn!("{} messages could not be read", stats.errors);
    }
    Ok(())
}

fn analyze_folders(dir: &str, format: ReportFormat) -> Result<()> {
    let mailbox = Maildir::open(dir)?;
    let analysis = FolderAnalysis::analyze(mailbox.folder_counts()?);
    print!("{}", analysis.render(format)?);
    Ok(())
}

fn sort(config: &Config, dir: &str, dry_run: bool) -> Result<()> {
    let engine = build_engine(config)?;
    let mailbox = Maildir::open(dir)?.with_dry_run(dry_run);
    let mut stats = RunStats::new();

    if mailbox.is_dry_run() {
        println!("🔍 DRY RUN - no messages will be moved");
        println!();
    }

    for entry in mailbox.list()? {
        let message = match mailbox.read(&entry) {
            Ok(message) => message,
            Err(e) => {
                log::error!("{e:#}");
                stats.record_event(StatEvent::Error);
                continue;
            }
        };

        let result = engine.classify_message(&message);
        log::debug!("{} → {:?}", entry.file_name, result.disposition);
        stats.record_event(StatEvent::Classified(result.clone()));

        let Some(folder) = result.target_folder.as_deref() else {
            continue;
        };
        match mailbox.move_to(&entry, folder) {
            Ok(_) => stats.record_move(&result),
            Err(e) => {
                log::error!("{e:#}");
                stats.record_event(StatEvent::Error);
            }
        }
    }

    let rule_names = engine.rules().iter().map(|r| r.name.clone()).collect();
    print_sort_summary(&stats, rule_names, mailbox.is_dry_run());
    Ok(())
}

fn print_sort_summary(stats: &RunStats, rule_names: Vec<String>, dry_run: bool) {
    let moved_label = if dry_run { "Would move" } else { "Moved" };

    println!("📊 Sort Summary");
    println!("═══════════════════════════════════════");
    println!("  Processed: {}", stats.processed);
    println!(
        "  ├─ Rule matches: {} ({:.1}%)",
        stats.matched,
        stats.percentage(stats.matched)
    );
    println!(
        "  ├─ Spam: {} ({:.1}%)",
        stats.spam,
        stats.percentage(stats.spam)
    );
    println!(
        "  └─ Unmatched: {} ({:.1}%)",
        stats.unmatched,
        stats.percentage(stats.unmatched)
    );
    println!("  {moved_label}: {}", stats.moved);
    println!("  Errors: {}", stats.errors);

    if !stats.by_folder.is_empty() {
        println!();
        println!("📁 By folder:");
        for (folder, count) in &stats.by_folder {
            println!("  {count:>5}  {folder}");
        }
    }

    if !stats.rules.is_empty() {
        println!();
        println!("📋 Rule matches:");
        for rule in stats.top_rules() {
            println!("  {:>5}  {} ({} moved)", rule.matches, rule.rule_name, rule.moved);
        }
    }

    let unmatched = stats.get_unmatched_rules(&rule_names);
    if !unmatched.is_empty() {
        println!();
        println!("Rules without matches this run ({}):", unmatched.len());
        for rule_name in unmatched {
            println!("  • {rule_name}");
        }
    }
}

fn apply(config: &mut Config, config_path: &str, file: &str) -> Result<()> {
    let outcome = apply_suggestions(config, Path::new(config_path), Path::new(file))?;

    for name in &outcome.added {
        println!("  ✓ Added rule: {name}");
    }
    for name in &outcome.skipped {
        println!("  ⊘ Skipped duplicate: {name}");
    }
    if outcome.added.is_empty() {
        println!("No new rules to add");
    } else {
        println!("✅ Added {} new rules", outcome.added.len());
    }
    Ok(())
}

fn import_thunderbird(file: &str, output: Option<&str>) -> Result<()> {
    let rules = thunderbird::import_file(file)?;
    match output {
        Some(path) => {
            rules.to_file(path)?;
            println!("Converted {} rules, saved to {path}", rules.len());
        }
        None => println!("{}", serde_json::to_string_pretty(&rules)?),
    }
    Ok(())
}

use anyhow::Result;
use leads_scraper::config::Config;
use leads_scraper::error::ScraperError;
use leads_scraper::pipeline::LeadPipeline;
use leads_scraper::types::{RawLead, SourceKind, WebsiteAnalyzer, WebsiteQuality};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;

fn test_config() -> Config {
    let toml = r#"
        [scraping]
        delay_between_requests_ms = 0
        request_timeout_secs = 5
        max_results_per_niche = 100

        [export]
        output_dir = "output"

        [niches.cafes]
        keywords_cz = ["kavárna"]

        [niches.restaurants]
        keywords_cz = ["restaurace"]
    "#;
    toml::from_str(toml).unwrap()
}

struct FixedVerdict(WebsiteQuality);

#[async_trait::async_trait]
impl WebsiteAnalyzer for FixedVerdict {
    async fn assess(&self, _url: &str) -> leads_scraper::error::Result<WebsiteQuality> {
        Ok(self.0)
    }
}

struct BrokenAnalyzer;

#[async_trait::async_trait]
impl WebsiteAnalyzer for BrokenAnalyzer {
    async fn assess(&self, url: &str) -> leads_scraper::error::Result<WebsiteQuality> {
        Err(ScraperError::Api {
            message: format!("no verdict for {url}"),
        })
    }
}

#[tokio::test]
async fn test_shared_registry_id_merges_across_sources() -> Result<()> {
    let raw = vec![
        RawLead::new(SourceKind::Registry, "Kavárna Nová s.r.o.")
            .with_address("Vodičkova 710/31", "Praha")
            .with_registry_id("12345678"),
        RawLead::new(SourceKind::Maps, "Kavarna Nova")
            .with_address("Vodičkova 31", "Praha")
            .with_website("https://kavarnanova.cz")
            .with_registry_id("12345678"),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("cafes", "Praha", raw).await?;

    assert_eq!(outcome.categorized.all.len(), 1);
    let lead = &outcome.categorized.all[0];
    assert!(lead.has_website);
    assert_eq!(lead.name, "Kavárna Nová s.r.o.");
    assert_eq!(lead.registry_id.as_deref(), Some("12345678"));
    assert_eq!(lead.provenance, vec![SourceKind::Registry, SourceKind::Maps]);
    assert!(outcome.categorized.has_website.iter().any(|l| l.identity == lead.identity));
    Ok(())
}

#[tokio::test]
async fn test_fuzzy_name_variants_on_same_street_merge() -> Result<()> {
    let raw = vec![
        RawLead::new(SourceKind::Maps, "Restaurace U Kostela")
            .with_address("Kostelní 7", "Praha")
            .with_phone("+420 777 123 456"),
        RawLead::new(SourceKind::Website, "Restaurace u kostela")
            .with_address("Kostelní 7", "Praha")
            .with_email("info@ukostela.cz"),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("restaurants", "Praha", raw).await?;

    assert_eq!(outcome.categorized.all.len(), 1);
    let lead = &outcome.categorized.all[0];
    // Display name comes from the higher trust source.
    assert_eq!(lead.name, "Restaurace U Kostela");
    assert_eq!(lead.phone.as_deref(), Some("420777123456"));
    assert_eq!(lead.emails, vec!["info@ukostela.cz"]);
    Ok(())
}

#[tokio::test]
async fn test_shared_phone_folds_leads_with_differing_registry_ids() -> Result<()> {
    // The registry rule only fires on equal ids; unequal ids fall through
    // to the phone rule.
    let raw = vec![
        RawLead::new(SourceKind::Registry, "Pekařství Novák a.s.")
            .with_address("Korunní 50", "Praha")
            .with_registry_id("25596641")
            .with_phone("+420 777 123 456"),
        RawLead::new(SourceKind::Maps, "Kavárna Nová")
            .with_address("Vodičkova 12", "Praha")
            .with_registry_id("26168685")
            .with_phone("777 123 456"),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("cafes", "Praha", raw).await?;

    assert_eq!(outcome.report.leads_after_merge, 2);
    assert_eq!(outcome.report.duplicates_collapsed, 1);
    assert_eq!(outcome.categorized.all.len(), 1);
    let lead = &outcome.categorized.all[0];
    // Registry outranks maps for the displayed id; the losing id stays
    // auditable as a conflict.
    assert_eq!(lead.registry_id.as_deref(), Some("25596641"));
    assert!(lead
        .conflicts
        .iter()
        .any(|c| c.field == "registry_id" && c.discarded == "26168685"));
    Ok(())
}

#[tokio::test]
async fn test_phone_sweep_collapses_across_name_buckets() -> Result<()> {
    // Neither record carries a registry id and the names share no leading
    // token, so merge bucketing keeps them apart; the dedup sweep has to
    // find the pair through the shared phone line.
    let raw = vec![
        RawLead::new(SourceKind::Maps, "Pizzerie Bella Roma")
            .with_address("Italská 8", "Praha")
            .with_phone("777 888 111")
            .with_rating(4.1, 52),
        RawLead::new(SourceKind::Website, "Trattoria Bella Roma")
            .with_address("Navrátilova 10", "Praha")
            .with_phone("+420 777 888 111")
            .with_email("ciao@bellaroma.cz"),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("restaurants", "Praha", raw).await?;

    assert_eq!(outcome.report.leads_after_merge, 2);
    assert_eq!(outcome.report.duplicates_collapsed, 1);
    assert_eq!(outcome.categorized.all.len(), 1);
    let lead = &outcome.categorized.all[0];
    assert_eq!(lead.name, "Pizzerie Bella Roma");
    assert_eq!(lead.phone.as_deref(), Some("420777888111"));
    assert_eq!(lead.emails, vec!["ciao@bellaroma.cz"]);
    Ok(())
}

#[tokio::test]
async fn test_absent_presence_signals_stack_to_high_tier() -> Result<()> {
    let raw = vec![RawLead::new(SourceKind::Maps, "Kavárna Nová")
        .with_address("Vodičkova 12", "Praha")
        .with_rating(4.5, 0)];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("cafes", "Praha", raw).await?;

    let lead = &outcome.categorized.all[0];
    assert_eq!(lead.priority_score, 195);
    assert!(!lead.has_website);
    assert!(outcome.categorized.no_website.iter().any(|l| l.identity == lead.identity));
    assert!(outcome.categorized.high.iter().any(|l| l.identity == lead.identity));
    Ok(())
}

#[tokio::test]
async fn test_nameless_record_is_skipped_and_counted() -> Result<()> {
    let raw = vec![
        RawLead::new(SourceKind::Maps, "  ").with_phone("777 123 456"),
        RawLead::new(SourceKind::Maps, "Kavárna Nová").with_address("Vodičkova 12", "Praha"),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("cafes", "Praha", raw).await?;

    assert_eq!(outcome.report.skipped_no_name, 1);
    assert_eq!(outcome.categorized.all.len(), 1);
    assert_eq!(outcome.categorized.all[0].name, "Kavárna Nová");
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_is_a_zero_result_run() -> Result<()> {
    let pipeline = LeadPipeline::new(test_config());
    let outcome = pipeline.run("cafes", "Praha", Vec::new()).await?;

    assert_eq!(outcome.report.raw_records, 0);
    assert_eq!(outcome.report.summary.total, 0);
    assert_eq!(outcome.report.summary.mean_score, 0.0);
    assert!(outcome.categorized.all.is_empty());
    assert!(outcome.categorized.high.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_poor_website_verdict_scores_between_extremes() -> Result<()> {
    let raw = vec![RawLead::new(SourceKind::Maps, "Restaurace Stará")
        .with_address("Dlouhá 3", "Praha")
        .with_website("https://stara-restaurace.com")
        .with_rating(4.2, 88)];

    let pipeline = LeadPipeline::new(test_config())
        .with_analyzer(Arc::new(FixedVerdict(WebsiteQuality::Poor)));
    let outcome = pipeline.run("restaurants", "Praha", raw).await?;

    let lead = &outcome.categorized.all[0];
    assert_eq!(lead.website_quality, Some(WebsiteQuality::Poor));
    // 75 poor website + 50 no email + 25 no social; never the 100-point
    // no-website signal alongside it.
    assert_eq!(lead.priority_score, 150);
    assert!(lead.score_notes.contains(&"poor website".to_string()));
    assert!(!lead.score_notes.contains(&"no website".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_analyzer_failure_leaves_lead_unjudged() -> Result<()> {
    let raw = vec![RawLead::new(SourceKind::Maps, "Restaurace Stará")
        .with_address("Dlouhá 3", "Praha")
        .with_website("https://stara-restaurace.com")
        .with_rating(4.2, 88)];

    let pipeline = LeadPipeline::new(test_config()).with_analyzer(Arc::new(BrokenAnalyzer));
    let outcome = pipeline.run("restaurants", "Praha", raw).await?;

    let lead = &outcome.categorized.all[0];
    assert_eq!(lead.website_quality, None);
    // Without a verdict the website earns neither penalty bonus.
    assert_eq!(lead.priority_score, 50 + 25);
    Ok(())
}

#[tokio::test]
async fn test_run_is_order_independent() -> Result<()> {
    let base = vec![
        RawLead::new(SourceKind::Registry, "Kavárna Nová s.r.o.")
            .with_address("Vodičkova 710/31", "Praha")
            .with_registry_id("25596641"),
        RawLead::new(SourceKind::Maps, "Kavarna Nova")
            .with_address("Vodičkova 31", "Praha")
            .with_website("https://kavarnanova.cz")
            .with_registry_id("25596641"),
        RawLead::new(SourceKind::Maps, "Restaurace U Kostela")
            .with_address("Kostelní 7", "Praha")
            .with_phone("777 123 456"),
        RawLead::new(SourceKind::Website, "Restaurace u kostela")
            .with_address("Kostelní 7", "Praha")
            .with_email("info@ukostela.cz"),
        RawLead::new(SourceKind::Maps, "Fitness Centrum Beta")
            .with_address("Sportovní 2", "Praha")
            .with_rating(4.9, 210),
    ];

    let pipeline = LeadPipeline::new(test_config());
    let reference = pipeline.run("cafes", "Praha", base.clone()).await?;
    let reference_prints: Vec<_> = reference
        .categorized
        .all
        .iter()
        .map(|l| {
            (
                l.identity.as_key(),
                l.name.clone(),
                l.address.clone(),
                l.phone.clone(),
                l.emails.clone(),
                l.priority_score,
            )
        })
        .collect();

    let mut rng = rand::rngs::StdRng::seed_from_u64(41);
    for _ in 0..5 {
        let mut shuffled = base.clone();
        shuffled.shuffle(&mut rng);
        let outcome = pipeline.run("cafes", "Praha", shuffled).await?;
        let prints: Vec<_> = outcome
            .categorized
            .all
            .iter()
            .map(|l| {
                (
                    l.identity.as_key(),
                    l.name.clone(),
                    l.address.clone(),
                    l.phone.clone(),
                    l.emails.clone(),
                    l.priority_score,
                )
            })
            .collect();
        assert_eq!(prints, reference_prints);
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_fails_at_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [scraping]
        delay_between_requests_ms = 0
        request_timeout_secs = 5
        max_results_per_niche = 100

        [matching]
        name_similarity_threshold = 1.5

        [export]
        output_dir = "output"

        [niches.cafes]
        keywords_cz = ["kavárna"]
        "#,
    )?;

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ScraperError::Config(_)));
    Ok(())
}

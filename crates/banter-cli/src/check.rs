//! Preflight configuration check.
//!
//! Builds everything that can fail at startup -- config validation, the
//! template store, the prompt budget -- and reports what the bot would
//! run with. Exits non-zero on the first problem.

use std::sync::Arc;

use banter_core::prompt::PromptAssembler;
use banter_core::template::TemplateStore;
use banter_types::config::BanterConfig;

pub fn run(config: &BanterConfig, json: bool) -> anyhow::Result<()> {
    config.validate()?;

    let templates = Arc::new(TemplateStore::with_defaults(&config.prompt.templates)?);
    let assembler = PromptAssembler::new(&config.persona, &config.prompt, templates)?;

    if json {
        let report = serde_json::json!({
            "ai_name": config.persona.ai_name,
            "wakewords": config.behavior.wakewords,
            "history_lines": config.prompt.history_lines,
            "history_budget_chars": assembler.max_history_chars(),
            "textgen_base_url": config.textgen.base_url,
            "image_enabled": config.image.enabled,
            "healthy": true,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let check = console::style("✓").green();
    println!();
    println!(
        "  Preflight check for '{}'",
        console::style(&config.persona.ai_name).cyan()
    );
    println!();
    println!("  {check} config valid");
    println!("  {check} templates valid");
    println!(
        "  {check} history budget: {} chars ({} lines requested)",
        assembler.max_history_chars(),
        config.prompt.history_lines
    );
    println!(
        "  {check} text backend: {}",
        console::style(&config.textgen.base_url).dim()
    );
    if config.image.enabled {
        println!(
            "  {check} image backend: {}",
            console::style(&config.image.base_url).dim()
        );
    } else {
        println!("  {} image backend disabled", console::style("-").dim());
    }
    let wakewords = if config.behavior.wakewords.is_empty() {
        "<none>".to_string()
    } else {
        config.behavior.wakewords.join(", ")
    };
    println!("  {check} wakewords: {wakewords}");
    println!();

    Ok(())
}

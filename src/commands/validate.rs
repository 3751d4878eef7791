use crate::output::UserOutput;
use std::path::Path;
use worktree_env::{Parser as ConfigParser, PatchKind};

pub fn run_validate(config_path: &Path, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status(&format!("Validating {}...", config_path.display()));

    let config = ConfigParser::new().load_config(config_path)?;
    config.validate()?;

    out.success("Configuration is valid");
    out.blank();

    out.status(&format!(
        "Databases: {}_wt1 .. {}_wt{}",
        config.base_database_name, config.base_database_name, config.max_slots
    ));

    out.status(&format!(
        "Services: {} (stride {})",
        config.services.len(),
        config.port_stride
    ));
    for service in &config.services {
        let last = u32::from(service.default_port)
            + config.max_slots * u32::from(config.port_stride);
        out.status(&format!(
            "  - {:<20} {} .. {}",
            service.name, service.default_port, last
        ));
    }

    if !config.env_files.is_empty() {
        out.status(&format!("Env files: {}", config.env_files.len()));
        for file in &config.env_files {
            out.status(&format!("  - {}", file.source.display()));
            for patch in &file.patches {
                let rule = match &patch.kind {
                    PatchKind::Database => "database".to_string(),
                    PatchKind::Redis => "redis".to_string(),
                    PatchKind::Port { service } => format!("port of {}", service),
                    PatchKind::Url { service } => format!("url port of {}", service),
                };
                out.status(&format!("      {} ({})", patch.var, rule));
            }
        }
    }

    if !config.post_setup.is_empty() {
        out.status(&format!(
            "postSetup: {} command(s){}",
            config.post_setup.len(),
            if config.auto_install {
                ", run automatically"
            } else {
                ""
            }
        ));
    }

    Ok(())
}

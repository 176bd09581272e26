use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::analysis::hydrology;
use crate::metrics::ImpactMetrics;

pub const FILENAME_PREFIX: &str = "EcoWatch_Relatorio_";
const RULE: &str = "-----------------------------------------------------------";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no region with measurable loss is selected")]
    NoSelection,
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Separators used when printing numbers in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NumberFormat {
    pub thousands: char,
    pub decimal: char,
}

impl NumberFormat {
    pub const PT_BR: Self = Self {
        thousands: '.',
        decimal: ',',
    };

    pub const EN_US: Self = Self {
        thousands: ',',
        decimal: '.',
    };

    pub fn integer(&self, value: u64) -> String {
        let digits = value.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (index, digit) in digits.chars().enumerate() {
            if index > 0 && (digits.len() - index) % 3 == 0 {
                grouped.push(self.thousands);
            }
            grouped.push(digit);
        }
        grouped
    }

    /// Grouped integer part plus up to two decimals, trailing zeros dropped.
    pub fn decimal(&self, value: f64) -> String {
        let sign = if value < 0.0 { "-" } else { "" };
        let cents = (value.abs() * 100.0).round() as u64;
        let whole = self.integer(cents / 100);
        let fraction = cents % 100;
        if fraction == 0 {
            format!("{sign}{whole}")
        } else {
            let fraction = format!("{fraction:02}");
            format!(
                "{sign}{whole}{}{}",
                self.decimal,
                fraction.trim_end_matches('0')
            )
        }
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::PT_BR
    }
}

/// Reports only exist for a selection with non-zero loss area.
pub fn ensure_selection(metrics: &ImpactMetrics) -> Result<(), ReportError> {
    if metrics.has_selection() {
        Ok(())
    } else {
        Err(ReportError::NoSelection)
    }
}

/// `EcoWatch_Relatorio_` + region without parentheses or commas, whitespace runs as `_`.
pub fn report_filename(region: &str) -> String {
    let mut name = String::from(FILENAME_PREFIX);
    let mut in_space = false;
    for ch in region.chars().filter(|c| !matches!(c, '(' | ')' | ',')) {
        if ch.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
        } else {
            name.push(ch);
            in_space = false;
        }
    }
    name.push_str(".txt");
    name
}

/// [`report_filename`] with path separators replaced so the name stays a single component.
fn disk_filename(region: &str) -> String {
    report_filename(region).replace(['/', '\\'], "-")
}

pub fn render_report(
    metrics: &ImpactMetrics,
    issued_at: DateTime<Local>,
    format: NumberFormat,
) -> String {
    let hydro = hydrology(metrics);

    let mut out = String::new();
    out.push_str("ECOWATCH INTELLIGENCE REPORT\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Data de Emissão: {}\n",
        issued_at.format("%d/%m/%Y %H:%M:%S")
    ));
    out.push_str(&format!("Localização Analisada: {}\n", metrics.region));
    out.push_str(RULE);
    out.push('\n');
    out.push_str("MÉTRICAS DE IMPACTO:\n");
    out.push_str(&format!(
        "- Área de Desmatamento (Ha): {}\n",
        format.decimal(metrics.loss_area_ha)
    ));
    out.push_str(&format!(
        "- Árvores Suprimidas (Total): {}\n",
        format.integer(metrics.trees_cut)
    ));
    out.push_str(&format!(
        "- Ritmo de Supressão: {} árvores/dia\n",
        format.integer(metrics.trees_cut_per_day)
    ));
    out.push_str(&format!(
        "- Alertas de Incêndio (Fogo): {} pontos detectados\n",
        metrics.fire_alerts
    ));
    out.push('\n');
    out.push_str("ANÁLISE QUÍMICA E ATMOSFÉRICA:\n");
    out.push_str(&format!(
        "- Perda de Sequestro de CO2: {} toneladas/ano\n",
        format.integer(metrics.co2_loss_tons)
    ));
    out.push_str(&format!(
        "- Redução na Produção de O2: {} toneladas/ano\n",
        format.integer(metrics.o2_lost_tons)
    ));
    out.push('\n');
    out.push_str("IMPACTO HÍDRICO (BOMBA BIÓTICA):\n");
    out.push_str(&format!(
        "- A região apresenta uma redução de {}% na capacidade de indução de chuvas locais.\n",
        hydro.induction_loss_pct
    ));
    out.push_str(&format!(
        "- Risco de desertificação microclimática: {}\n",
        hydro.desertification_risk.label()
    ));
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out.push_str("Relatório baseado em dados Global Forest Watch e\n");
    out.push_str("processamento inteligente.\n");
    out
}

pub struct ReportExporter {
    output_dir: PathBuf,
    format: NumberFormat,
}

impl ReportExporter {
    pub fn new(output_dir: impl AsRef<Path>, format: NumberFormat) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            format,
        }
    }

    /// Renders the report for `metrics` stamped with the current local time.
    pub fn render(&self, metrics: &ImpactMetrics) -> String {
        render_report(metrics, Local::now(), self.format)
    }

    pub fn write(&self, metrics: &ImpactMetrics) -> Result<PathBuf, ReportError> {
        ensure_selection(metrics)?;
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(disk_filename(&metrics.region));
        fs::write(&path, self.render(metrics))?;
        info!(path = %path.display(), "report exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn amazon() -> ImpactMetrics {
        ImpactMetrics {
            region: "Bioma Amazônia (-3.400, -62.200)".into(),
            loss_area_ha: 433.03,
            trees_cut: 194_863,
            trees_cut_per_day: 1_067,
            co2_loss_tons: 19_486,
            o2_lost_tons: 5_196,
            fire_alerts: 168,
            last_update: "Atualizado via Entrada Manual".into(),
        }
    }

    #[test]
    fn filename_strips_punctuation() {
        assert_eq!(
            report_filename("Bioma Amazônia (-3.400, -62.200)"),
            "EcoWatch_Relatorio_Bioma_Amazônia_-3.400_-62.200.txt"
        );
        assert_eq!(
            report_filename("Cinturão de Taiga / Boreal Norte (62.000, 15.000)"),
            "EcoWatch_Relatorio_Cinturão_de_Taiga_/_Boreal_Norte_62.000_15.000.txt"
        );
        assert_eq!(
            report_filename("Global / Selecione um ponto no mapa"),
            "EcoWatch_Relatorio_Global_/_Selecione_um_ponto_no_mapa.txt"
        );
        assert_eq!(
            report_filename("Área  Monitorada\t(1, 2)"),
            "EcoWatch_Relatorio_Área_Monitorada_1_2.txt"
        );
    }

    #[test]
    fn integer_grouping() {
        let pt = NumberFormat::PT_BR;
        assert_eq!(pt.integer(0), "0");
        assert_eq!(pt.integer(999), "999");
        assert_eq!(pt.integer(1_000), "1.000");
        assert_eq!(pt.integer(194_863), "194.863");
        assert_eq!(pt.integer(12_345_678), "12.345.678");
        assert_eq!(NumberFormat::EN_US.integer(1_234_567), "1,234,567");
    }

    #[test]
    fn decimal_formatting() {
        let pt = NumberFormat::PT_BR;
        assert_eq!(pt.decimal(433.03), "433,03");
        assert_eq!(pt.decimal(1_234.5), "1.234,5");
        assert_eq!(pt.decimal(2_000.0), "2.000");
        assert_eq!(NumberFormat::EN_US.decimal(1_234.56), "1,234.56");
    }

    #[test]
    fn report_sections_and_values() {
        let issued = Local.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let text = render_report(&amazon(), issued, NumberFormat::PT_BR);

        assert!(text.starts_with("ECOWATCH INTELLIGENCE REPORT\n"));
        assert!(text.contains("Data de Emissão: 14/03/2025 09:30:00"));
        assert!(text.contains("Localização Analisada: Bioma Amazônia (-3.400, -62.200)"));
        assert!(text.contains("- Área de Desmatamento (Ha): 433,03"));
        assert!(text.contains("- Árvores Suprimidas (Total): 194.863"));
        assert!(text.contains("- Ritmo de Supressão: 1.067 árvores/dia"));
        assert!(text.contains("- Alertas de Incêndio (Fogo): 168 pontos detectados"));
        assert!(text.contains("- Perda de Sequestro de CO2: 19.486 toneladas/ano"));
        assert!(text.contains("- Redução na Produção de O2: 5.196 toneladas/ano"));
        assert!(text.contains("redução de 22% na capacidade"));
        assert!(text.contains("microclimática: MODERADO"));
        assert!(text.contains("IMPACTO HÍDRICO (BOMBA BIÓTICA):"));
        assert!(text.ends_with("processamento inteligente.\n"));
    }

    #[test]
    fn heavy_loss_report_flags_high_risk() {
        let metrics = ImpactMetrics {
            loss_area_ha: 950.0,
            ..amazon()
        };
        let issued = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let text = render_report(&metrics, issued, NumberFormat::PT_BR);
        assert!(text.contains("redução de 75% na capacidade"));
        assert!(text.contains("microclimática: ALTO"));
    }

    #[test]
    fn exporter_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path().join("reports"), NumberFormat::PT_BR);

        let path = exporter.write(&amazon()).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "EcoWatch_Relatorio_Bioma_Amazônia_-3.400_-62.200.txt"
        );
        let data = fs::read_to_string(path).unwrap();
        assert!(data.contains("194.863"));
    }

    #[test]
    fn exporter_refuses_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path().join("reports"), NumberFormat::PT_BR);

        let err = exporter.write(&ImpactMetrics::no_selection()).unwrap_err();

        assert!(matches!(err, ReportError::NoSelection));
        assert!(!dir.path().join("reports").exists());
    }

    #[test]
    fn exporter_keeps_slashed_regions_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path(), NumberFormat::PT_BR);
        let metrics = ImpactMetrics {
            region: "Cinturão de Taiga / Boreal Norte (62.000, 15.000)".into(),
            ..amazon()
        };

        let path = exporter.write(&metrics).unwrap();

        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "EcoWatch_Relatorio_Cinturão_de_Taiga_-_Boreal_Norte_62.000_15.000.txt"
        );
    }
}

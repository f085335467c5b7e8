/*!
Builder de texte au format exposition pour les stubs

Produit des lignes `index{k="v",...} valeur` comme le ferait un exporter,
avec des raccourcis pour les échantillons applicatifs.
*/

/// Accumulates exposition lines.
#[derive(Debug, Clone, Default)]
pub struct ExpositionBuilder {
    lines: Vec<String>,
}

impl ExpositionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ligne de commentaire (`# ...`), ignorée par le filtre du collecteur
    pub fn comment(mut self, text: &str) -> Self {
        self.lines.push(format!("# {text}"));
        self
    }

    pub fn sample(mut self, index: &str, labels: &[(&str, &str)], value: f64) -> Self {
        let labels = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(",");
        self.lines.push(format!("{index}{{{labels}}} {value}"));
        self
    }

    /// Échantillon rattaché à une application (`app_id`)
    pub fn app_sample(self, index: &str, app_id: &str, value: f64) -> Self {
        self.sample(index, &[("app_id", app_id)], value)
    }

    /// Les quatre indexes suivis pour une application, avec la même valeur
    pub fn app_usage(self, app_id: &str, cpu: f64, memory: f64) -> Self {
        self.app_sample("container_cpu_usage_high_result", app_id, cpu)
            .app_sample("container_cpu_usage_low_result", app_id, cpu)
            .app_sample("container_memory_usage_high_result", app_id, memory)
            .app_sample("container_memory_usage_low_result", app_id, memory)
    }

    /// Ligne libre, pour injecter du texte malformé
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_formats_lines() {
        let text = ExpositionBuilder::new()
            .comment("TYPE x gauge")
            .sample("x", &[("a", "1"), ("b", "2")], 0.5)
            .app_sample("y", "app-1", 2.0)
            .build();
        assert_eq!(text, "# TYPE x gauge\nx{a=\"1\",b=\"2\"} 0.5\ny{app_id=\"app-1\"} 2\n");
    }

    #[test]
    fn test_app_usage_emits_four_lines() {
        let text = ExpositionBuilder::new().app_usage("a", 10.0, 20.0).build();
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains("container_memory_usage_low_result{app_id=\"a\"} 20"));
    }

    #[test]
    fn test_empty_builder() {
        assert_eq!(ExpositionBuilder::new().build(), "");
    }
}

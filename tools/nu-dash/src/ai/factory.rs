use crate::ai::gemini::GeminiGenerator;
use crate::ai::ollama::OllamaGenerator;
use crate::ai::TextGenerator;
use crate::config::AiBackend;
use crate::runtime::ProcessRunner;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct GeneratorFactory {
    generators: BTreeMap<AiBackend, Arc<dyn TextGenerator>>,
}

impl GeneratorFactory {
    pub fn with_defaults(runner: Arc<dyn ProcessRunner>, env: &[(String, String)]) -> Self {
        let mut this = Self::default();
        this.register(Arc::new(OllamaGenerator::new(runner)));
        this.register(Arc::new(GeminiGenerator::from_env(env)));
        this
    }

    pub fn register(&mut self, generator: Arc<dyn TextGenerator>) {
        self.generators.insert(generator.backend(), generator);
    }

    pub fn get(&self, backend: AiBackend) -> Option<Arc<dyn TextGenerator>> {
        self.generators.get(&backend).cloned()
    }
}

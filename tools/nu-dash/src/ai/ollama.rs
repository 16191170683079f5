use crate::ai::TextGenerator;
use crate::config::AiBackend;
use crate::errors::DashError;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use std::sync::Arc;

/// Local models through the `ollama` CLI, pulling the model on first use.
pub struct OllamaGenerator {
    runner: Arc<dyn ProcessRunner>,
}

impl OllamaGenerator {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn ollama(&self, args: &[&str], stdin: Option<&str>) -> Result<ProcessOutput, DashError> {
        let output = self
            .runner
            .run(ProcessRequest {
                program: "ollama".to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
                stdin: stdin.map(str::to_string),
                ..ProcessRequest::default()
            })
            .map_err(|e| DashError::Ai(e.to_string()))?;
        if let Some(failure) = output.failure() {
            let detail = output.stderr.trim();
            return Err(DashError::Ai(if detail.is_empty() {
                format!("ollama {}: {failure}", args.join(" "))
            } else {
                format!("ollama {}: {failure}: {detail}", args.join(" "))
            }));
        }
        Ok(output)
    }

    fn pull_if_needed(&self, model: &str) -> Result<(), DashError> {
        let listing = self.ollama(&["list"], None)?;
        if !model_is_listed(&listing.stdout, model) {
            self.ollama(&["pull", model], None)?;
        }
        Ok(())
    }
}

fn model_is_listed(listing: &str, model: &str) -> bool {
    let tagged = if model.contains(':') {
        model.to_string()
    } else {
        format!("{model}:latest")
    };
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == model || name == tagged)
}

impl TextGenerator for OllamaGenerator {
    fn backend(&self) -> AiBackend {
        AiBackend::Ollama
    }

    fn generate(&self, prompt: &str, model: &str) -> Result<String, DashError> {
        self.pull_if_needed(model)?;
        let output = self.ollama(&["run", model], Some(prompt))?;
        Ok(format!("\n{}\n", output.stdout.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::{model_is_listed, OllamaGenerator};
    use crate::ai::TextGenerator;
    use crate::runtime::{FakeProcessRunner, ProcessOutput};
    use std::sync::Arc;

    const LISTING: &str = "NAME            ID      SIZE   MODIFIED\n\
                           llama3.2:latest a80c   2.0 GB 2 days ago\n";

    #[test]
    fn listed_models_match_with_or_without_tag() {
        assert!(model_is_listed(LISTING, "llama3.2"));
        assert!(model_is_listed(LISTING, "llama3.2:latest"));
        assert!(!model_is_listed(LISTING, "mistral"));
        assert!(!model_is_listed(LISTING, "NAME"));
    }

    #[test]
    fn present_model_is_not_pulled_and_output_is_trimmed() {
        let runner = FakeProcessRunner::default();
        runner.on_command("ollama list", Ok(ProcessOutput::success(LISTING)));
        runner.on_command("ollama run", Ok(ProcessOutput::success("  It is fine.  \n")));
        let generator = OllamaGenerator::new(Arc::new(runner.clone()));

        let text = generator.generate("explain", "llama3.2").expect("generate");
        assert_eq!(text, "\nIt is fine.\n");
        assert!(!runner.invoked("ollama pull"));
        let run = runner
            .requests()
            .into_iter()
            .find(|request| request.command_line().starts_with("ollama run"))
            .expect("run request");
        assert_eq!(run.stdin.as_deref(), Some("explain"));
    }

    #[test]
    fn missing_model_is_pulled_first() {
        let runner = FakeProcessRunner::default();
        runner.on_command("ollama list", Ok(ProcessOutput::success("NAME ID\n")));
        runner.on_command("ollama pull", Ok(ProcessOutput::success("")));
        runner.on_command("ollama run", Ok(ProcessOutput::success("ok")));
        let generator = OllamaGenerator::new(Arc::new(runner.clone()));
        generator.generate("p", "mistral").expect("generate");
        assert!(runner.invoked("ollama pull mistral"));
    }

    #[test]
    fn failures_surface_as_errors_not_text() {
        let runner = FakeProcessRunner::default();
        runner.on_command("ollama list", Err("failed to spawn `ollama`".to_string()));
        let generator = OllamaGenerator::new(Arc::new(runner));
        let err = generator.generate("p", "mistral").expect_err("must fail");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("failed to spawn"));
    }
}

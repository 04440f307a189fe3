use super::request::TriageRequest;

/// Render the triage prompt. Field text is inserted as-is; it only ever reaches
/// the runner's stdin, never a shell.
pub fn build_prompt(req: &TriageRequest) -> String {
    format!(
        "You are a professional medical triage assistant.\n\
         Provide concise, safe, and clear medical advice.\n\
         Patient Info:\n\
         - Name: {}\n\
         - Age: {}\n\
         - Symptoms: {}\n\
         \n\
         Triage advice:\n",
        req.name(),
        req.age(),
        req.symptoms()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, age: u8, symptoms: &str) -> TriageRequest {
        TriageRequest::from_value(&json!({"name": name, "age": age, "symptoms": symptoms})).unwrap()
    }

    #[test]
    fn renders_fixed_template() {
        let prompt = build_prompt(&request("Ada", 36, "persistent cough"));
        assert_eq!(
            prompt,
            "You are a professional medical triage assistant.\n\
             Provide concise, safe, and clear medical advice.\n\
             Patient Info:\n\
             - Name: Ada\n\
             - Age: 36\n\
             - Symptoms: persistent cough\n\
             \n\
             Triage advice:\n"
        );
    }

    #[test]
    fn preserves_untrusted_text_verbatim() {
        let name = "Bob'; rm -rf / #{x}";
        let symptoms = "pain \"here\" & $(there)\n\\n {}";
        let prompt = build_prompt(&request(name, 7, symptoms));
        assert!(prompt.contains(name));
        assert!(prompt.contains("- Age: 7\n"));
        assert!(prompt.contains(symptoms));
    }

    #[test]
    fn is_deterministic() {
        let req = request("Zoë", 90, "dizziness when standing");
        assert_eq!(build_prompt(&req), build_prompt(&req.clone()));
    }
}

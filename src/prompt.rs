//! Template rendering for transform prompts.

use std::collections::HashMap;

/// Render a template in a single pass.
///
/// `{input}` becomes `input`; `{key}` becomes `vars[key]`. Placeholders with
/// no matching var are left as-is. Use `{{` and `}}` for literal braces.
/// Substituted text is never re-scanned.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use llm_orchestra::prompt::render;
///
/// let vars = HashMap::from([("lang".to_string(), "French".to_string())]);
/// let out = render("Translate to {lang}: {input} {{as JSON}}", "hello", &vars);
/// assert_eq!(out, "Translate to French: hello {as JSON}");
/// ```
pub fn render(template: &str, input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len() + input.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let key = &tail[1..end];
                let value = if key == "input" {
                    Some(input)
                } else {
                    vars.get(key).map(String::as_str)
                };
                if let Some(value) = value {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Whether `template` has an unescaped `{input}` slot.
pub fn mentions_input(template: &str) -> bool {
    const PROBE: &str = "\x00input\x00";
    render(template, PROBE, &HashMap::new()).contains(PROBE)
}

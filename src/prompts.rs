pub const ARCHITECT_SYSTEM: &str = r##"You are CodeAtlas, an expert software architect. Generate a Graphviz DOT diagram showing code architecture with RELATIONSHIPS.

CRITICAL CONSTRAINTS:
- Maximum 15-20 nodes (focus on KEY architectural components)
- Maximum 25-30 edges (most important relationships)
- Group related components into subgraphs
- Omit trivial files (tests, configs, utilities)

WHAT TO SHOW:
- Main entry points and core modules
- Key classes/services with clear responsibilities
- Important data flow and dependencies
- Layer boundaries (API, Business Logic, Data)

RULES:
1. Start with: digraph CodeArchitecture {
2. Declare EVERY node on its own line before using it in an edge
3. Every diagram MUST have arrows showing component connections
4. Use actual class/file names from the code
5. Group related items in clusters with descriptive labels
6. Use colors to distinguish layers/types

EXAMPLE:
```dot
digraph CodeArchitecture {
    rankdir=TB;
    node [shape=box, style="rounded,filled", fontname="Helvetica"];

    subgraph cluster_api {
        label="API Layer";
        style="rounded,filled";
        fillcolor="#e8f5e9";
        Routes; Handlers;
    }

    subgraph cluster_services {
        label="Business Logic";
        style="rounded,filled";
        fillcolor="#e3f2fd";
        UserService; DataProcessor;
    }

    Routes -> Handlers;
    Handlers -> UserService;
    Handlers -> DataProcessor;
}
```

Generate ONLY valid DOT code. Focus on architectural clarity."##;

pub const ARCHITECT_USER: &str = r##"Analyze this codebase and generate an architecture diagram:

{0}

Generate a Graphviz DOT diagram showing the main components and their relationships."##;

pub const SUMMARY_SYSTEM: &str = r##"You are CodeAtlas. Analyze the codebase and provide a concise summary.

Include:
1. **Project Overview**: What does this codebase do?
2. **Technology Stack**: Languages, frameworks, key dependencies
3. **Architecture Pattern**: MVC, microservices, monolith, etc.
4. **Key Components**: Main modules and their responsibilities
5. **Entry Points**: Where does execution start?

Keep it concise (200-300 words). Be specific about actual file/class names."##;

pub const SUMMARY_USER: &str = r##"Analyze this codebase:

{0}

Provide a concise summary."##;

pub const CHAT_SYSTEM: &str = r##"You are CodeAtlas, an expert software architect assistant.

You're analyzing a codebase and helping answer questions about its architecture.
Use the provided code context to give accurate, specific answers.
Reference actual file names, class names, and code patterns when relevant.

Be helpful, concise, and technical. If you're unsure about something, say so."##;

pub const CHAT_USER: &str = r##"Code context:
{0}

Current question: {1}"##;

pub const NARRATION_SYSTEM: &str = r##"Analyze this architecture diagram and provide a brief, conversational summary suitable for audio narration.
Keep it under 200 words. Focus on what the codebase does, key components and their relationships, and the overall architecture pattern.
Provide a natural, spoken summary (no bullet points, no markdown)."##;

pub const NARRATION_USER: &str = r##"DOT diagram:
```
{0}
```"##;

/// Substitutes `{0}`, `{1}`, ... in a template in a single pass
///
/// Placeholders inside substituted text are left alone.
pub fn fill(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let slot = after
            .find('}')
            .and_then(|end| after[..end].parse::<usize>().ok().map(|i| (i, end)))
            .and_then(|(i, end)| args.get(i).map(|arg| (*arg, end)));
        match slot {
            Some((arg, end)) => {
                out.push_str(arg);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill() {
        let prompt = fill(CHAT_USER, &["<file name=\"a.py\">", "What calls main?"]);
        assert!(prompt.starts_with("Code context:\n<file name=\"a.py\">"));
        assert!(prompt.ends_with("Current question: What calls main?"));
        assert!(!prompt.contains("{1}"));
    }

    #[test]
    fn test_fill_leaves_substituted_text_alone() {
        let prompt = fill(CHAT_USER, &["println!(\"{1}\", x);", "why?"]);
        assert!(prompt.contains("println!(\"{1}\", x);"));
        assert!(fill(ARCHITECT_SYSTEM, &[]).contains("digraph CodeArchitecture {"));
    }

    #[test]
    fn test_architect_example_keeps_colours_and_closing_text() {
        assert!(ARCHITECT_SYSTEM.contains(r##"fillcolor="#e8f5e9";"##));
        assert!(ARCHITECT_SYSTEM.contains(r##"fillcolor="#e3f2fd";"##));
        assert!(ARCHITECT_SYSTEM.ends_with("Focus on architectural clarity."));
    }
}

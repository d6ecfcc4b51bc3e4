//! Built-in operator roles used by the linear software project.
//!
//! Each function decorates an [`OperatorBuilder`] with instructions and the role's
//! prompt capabilities, leaving clients, tools and storage to the caller:
//!
//! ```rust,ignore
//! let exec = roles::executive(Operator::builder("Executive"))
//!     .client("scripted", client)
//!     .build()?;
//! ```

use serde_json::Value;

use crate::core::arguments::{Arguments, render_text};
use crate::core::error::Result;
use crate::core::operator::OperatorBuilder;

pub const EXECUTIVE_INSTRUCTIONS: &str = "You are an expert executive software developer. You will follow the instructions given to you to complete each task.";

pub const DEVELOPER_INSTRUCTIONS: &str = "You are an expert software developer. You will follow the instructions given to you to complete each task.";

pub const GENERIC_INSTRUCTIONS: &str = "You are an autonomous operator acting as a helpful and thoughtful assistant. You will be given additional context to complete a task. Clearly state when a task is beyond your capabilities.";

/// The developer's answer when a component needs no clarification.
pub const NO_QUESTION: &str = "No Question";

/// Plans components, answers the developer's questions and keeps the running summary.
///
/// Capabilities: `plan_components(starting_prompt)`, `answer_question(context, question)`,
/// `generate_summary(summary, implementation)`, `chat(message)`.
pub fn executive(builder: OperatorBuilder) -> OperatorBuilder {
    builder
        .instructions(EXECUTIVE_INSTRUCTIONS)
        .prompt("plan_components", plan_components)
        .prompt("answer_question", answer_question)
        .prompt("generate_summary", generate_summary)
        .prompt("chat", chat)
}

/// Asks clarifying questions, implements components and integrates them.
///
/// Capabilities: `ask_question(context)`, `implement_component(context)`,
/// `integrate_components(planned_components, implementations, idea)`, `chat(message)`.
pub fn developer(builder: OperatorBuilder) -> OperatorBuilder {
    builder
        .instructions(DEVELOPER_INSTRUCTIONS)
        .prompt("ask_question", ask_question)
        .prompt("implement_component", implement_component)
        .prompt("integrate_components", integrate_components)
        .prompt("chat", chat)
}

/// A plain conversational operator with a single `chat(message)` capability.
pub fn generic(builder: OperatorBuilder) -> OperatorBuilder {
    builder.instructions(GENERIC_INSTRUCTIONS).prompt("chat", chat)
}

fn chat(args: &Arguments) -> Result<String> {
    args.text("message")
}

fn plan_components(args: &Arguments) -> Result<String> {
    let starting_prompt = args.text("starting_prompt")?;
    Ok(format!(
        "List the essential code components required to implement the project idea. Each component should be atomic, \
so that a developer could implement it in isolation given placeholders for the components before it.

Your response must:
1. Name specific components
2. Be complete and accurate
3. Use the technical terms of the chosen language and framework
4. Order components so later ones depend on earlier ones
5. Leave out implementation details and code snippets
6. Assume all dependencies are installed but NOT imported
7. Be decisive and unambiguous
8. Describe each component declaratively, starting with an action verb

Project Idea:
{starting_prompt}"
    ))
}

fn answer_question(args: &Arguments) -> Result<String> {
    let context = args.text("context")?;
    let question = args.text("question")?;
    Ok(format!(
        "Context: {context}\nDeveloper's Question: {question}\n\
As the senior advisor, answer the developer's question about this component with specificity. \
If there is no question, respond with 'Okay'. Do not offer clarification unprompted."
    ))
}

fn generate_summary(args: &Arguments) -> Result<String> {
    let summary = args.text_or_default("summary");
    let implementation = args.text("implementation")?;
    Ok(format!(
        "Summarize what has been implemented in the current component and append it to the list of previously summarized components.

For its summary:
1. Include file names, function names and variable names.
2. State the component's purpose and behaviour objectively.
3. Be concise.

Example Output:
[\"1. Imported numpy as np in the file 'main.py'\",
\"2. Created a function 'calculate_mean' that returns the mean of a np.array in the file 'util.py'\",
\"3. Imported 'calculate_mean' in the file 'main.py'\"]

Current Component Implementation: {implementation}
Previous Components: {summary}"
    ))
}

fn ask_question(args: &Arguments) -> Result<String> {
    let context = args.text("context")?;
    Ok(format!(
        "*Context:*
{context}

If necessary, ask one essential question needed to continue the implementation.
If no question is necessary, respond '{NO_QUESTION}'.

**Example:**
    Context:
    1. Imported the Flask module from the flask package
    Current Component: Create a Flask application instance

    {NO_QUESTION}

**Example:**
    Context:
    1. Imported the Flask module from the flask package
    2. Created a Flask application named \"app\"
    3. Created a route for the root URL ('/')
    Current Component: Create the function called when the root URL is accessed. It returns HTML with a title, an author and a paragraph.

    What should the function be called?"
    ))
}

fn implement_component(args: &Arguments) -> Result<String> {
    let context = args.text("context")?;
    Ok(format!(
        "Provide complete and accurate code for the current component only. Your code will be used to implement the starting prompt. \
Use placeholders that reference code already provided in the context. Never provide unspecified code.
*Context:*
{context}"
    ))
}

fn integrate_components(args: &Arguments) -> Result<String> {
    let components = args.list("planned_components")?;
    let implementations = args.list("implementations")?;
    let idea = args.text("idea")?;

    let rendered: String = components
        .iter()
        .zip(implementations)
        .map(|(description, code)| {
            format!(
                "\nComponent description: {}\nImplementation\n{}\n",
                render_text(description),
                render_file(code)
            )
        })
        .collect();

    Ok(format!(
        "Task: Use ALL of the provided components to implement the original idea. Include every provided file.
Idea: {idea}

First, think about all files you intend to use in the final output. Then, combine the code from each component into those files.
**Components:**
{rendered}"
    ))
}

fn render_file(code: &Value) -> String {
    match (
        code.get("file_name").and_then(Value::as_str),
        code.get("file_contents").and_then(Value::as_str),
    ) {
        (Some(name), Some(contents)) => format!("File: {name}\nFile Contents:\n{contents}"),
        _ => render_text(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::OrchestrationError;
    use crate::core::operator::Operator;
    use serde_json::json;

    #[test]
    fn test_role_capabilities() {
        let exec = executive(Operator::builder("Executive")).build().unwrap();
        assert_eq!(
            exec.capabilities().collect::<Vec<_>>(),
            vec!["answer_question", "chat", "generate_summary", "plan_components"]
        );
        assert_eq!(exec.instructions(), EXECUTIVE_INSTRUCTIONS);

        let dev = developer(Operator::builder("Developer")).build().unwrap();
        assert!(dev.has_capability("implement_component"));
        assert!(!dev.has_capability("plan_components"));

        let assistant = generic(Operator::builder("Assistant")).build().unwrap();
        assert_eq!(assistant.capabilities().collect::<Vec<_>>(), vec!["chat"]);
    }

    #[test]
    fn test_integrate_renders_files() {
        let args = Arguments::new()
            .with("planned_components", json!(["Create app", "Add route"]))
            .with(
                "implementations",
                json!([
                    { "file_name": "app.py", "file_contents": "app = Flask()" },
                    "route code"
                ]),
            )
            .with("idea", "hello world site");
        let prompt = integrate_components(&args).unwrap();

        assert!(prompt.contains("Idea: hello world site"));
        assert!(prompt.contains("Component description: Create app"));
        assert!(prompt.contains("File: app.py\nFile Contents:\napp = Flask()"));
        assert!(prompt.contains("route code"));
    }

    #[test]
    fn test_prompts_require_arguments() {
        let err = plan_components(&Arguments::new()).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidArguments { .. }));

        let prompt = generate_summary(&Arguments::new().with("implementation", "x = 1")).unwrap();
        assert!(prompt.ends_with("Previous Components: "));
    }
}

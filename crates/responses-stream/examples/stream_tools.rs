use std::sync::Arc;

use responses_stream::prelude::*;

#[derive(serde::Deserialize)]
struct WeatherArgs {
    city: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    let responder = Responder::from_env()?;

    let tools = FunctionToolStore::new().add(typed_tool("get_weather", |args: WeatherArgs| {
        Ok(format!("{{\"city\":\"{}\",\"forecast\":\"light rain\"}}", args.city))
    }))?;

    let request = ResponseRequest::new("gpt-5-nano")
        .user_text("What's the weather in Bergen?")
        .store(true)
        .function_tool(
            FunctionToolDefinition::new(
                "get_weather",
                serde_json::json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"],
                    "additionalProperties": false
                }),
            )
            .description("Current weather for a city"),
        );

    let outputs = Arc::new(std::sync::Mutex::new(Vec::<FunctionToolCallOutput>::new()));
    let sink = outputs.clone();
    let first = responder
        .stream(&request)?
        .with_tools(Arc::new(tools))
        .on_tool_call(|name, arguments| eprintln!("tool call {name}({arguments})"))
        .on_tool_result(move |_, output| {
            if let Ok(mut outputs) = sink.lock() {
                outputs.push(output.clone());
            }
        })
        .response()
        .await?;

    let outputs = outputs.lock().map(|o| o.clone()).unwrap_or_default();
    if outputs.is_empty() {
        println!("{}", first.output_text().unwrap_or_default());
        return Ok(());
    }

    let mut follow_up = ResponseRequest::new("gpt-5-nano").previous_response_id(first.id.clone());
    for output in &outputs {
        follow_up = follow_up.input_item(output.to_input_item());
    }
    let text = responder
        .stream(&follow_up)?
        .on_text_delta(|delta| print!("{delta}"))
        .text()
        .await?;
    println!("\n({} chars)", text.len());
    Ok(())
}

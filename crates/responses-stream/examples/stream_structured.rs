use responses_stream::prelude::*;

#[derive(Debug, serde::Deserialize)]
struct City {
    name: String,
    country: String,
    population: u64,
}

#[derive(Debug, Default, serde::Deserialize)]
struct PartialCity {
    name: Option<String>,
    country: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    let responder = Responder::from_env()?;

    let request = ResponseRequest::new("gpt-5-nano")
        .user_text("Describe the largest city in Norway.")
        .json_schema(
            "city",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "country": {"type": "string"},
                    "population": {"type": "integer"}
                },
                "required": ["name", "country", "population"],
                "additionalProperties": false
            }),
        );

    let parsed = responder
        .stream_parsed::<City>(&request)?
        .on_partial_parsed(|partial: PartialCity| {
            eprintln!("partial: {:?} / {:?}", partial.name, partial.country);
        })
        .parsed()
        .await?;

    let city = parsed.parsed;
    println!("{} ({}) has {} inhabitants", city.name, city.country, city.population);
    Ok(())
}

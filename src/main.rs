use futures::StreamExt;
use ollama_chat_adapter::{
    config::{Config, LoggingConfig},
    models::{GenerationParams, ImageSource, UserInput},
    runtime::Runtime,
    session::ChatSession,
    translate::TargetLanguage,
    Error,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    // 加载配置
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {} ({}), using default config", config_path, e);
            Config::default()
        }
    };

    init_logging(&config.logging);
    info!("Starting ollama chat against {}", config.ollama.base_url);

    let runtime = Runtime::connect(config).await?;
    let mut params = runtime.config().generation.clone();
    if !runtime.models().is_empty() && !runtime.models().contains(&params.model) {
        warn!(
            "Model '{}' is not in the server's model list: {}",
            params.model,
            runtime.models().join(", ")
        );
    }

    let mut session = runtime.new_session();
    let translator = runtime.translator();
    let mut pending_images: Vec<PathBuf> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Chatting with '{}'. Type /help for commands.", params.model);

    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Attach(path) => {
                pending_images.push(path);
                println!("{} image(s) attached to the next message", pending_images.len());
            }
            Command::Save(path) => match session.save_image(ImageSource::Path(path)) {
                Ok(()) => println!("{} saved image(s)", session.saved_images().len()),
                Err(Error::EmptyInput) => println!("No image to add"),
                Err(e) => println!("{}", e),
            },
            Command::ListSaved => println!("{} saved image(s)", session.saved_images().len()),
            Command::ClearSaved => {
                session.clear_saved_images();
                println!("Saved images cleared");
            }
            Command::Reset => {
                session.reset();
                println!("Conversation cleared");
            }
            Command::Models => {
                if runtime.models().is_empty() {
                    println!("No models reported by the server");
                }
                for model in runtime.models() {
                    println!("  {}", model);
                }
            }
            Command::Model(name) => {
                params.model = name;
                println!("Using model '{}'", params.model);
            }
            Command::Translate(language, text) => {
                // 与聊天一致，失败信息直接作为结果展示
                let reply = match language.parse::<TargetLanguage>() {
                    Ok(language) => match translator.translate(&text, language).await {
                        Ok(translation) => translation,
                        Err(e) => format!("Error: {}", e),
                    },
                    Err(e) => format!("Error: {}", e),
                };
                println!("{}", reply);
            }
            Command::Prompt(text) => {
                // 提交被接受之前不清空排队的图片
                let input = UserInput {
                    text: Some(text),
                    images: pending_images.iter().cloned().map(ImageSource::Path).collect(),
                };
                let outcome = respond(&mut session, input, &params, &mut stdout).await?;
                if let Some(notice) = settle_pending(&mut pending_images, outcome) {
                    println!("{}", notice);
                }
            }
        }
    }

    info!("Chat session ended");
    Ok(())
}

const HELP: &str = "\
Commands:
  /attach <path>   attach an image to the next message
  /save <path>     save an image to ask about later
  /saved           show how many images are saved
  /clear-saved     forget saved images
  /reset           clear the conversation
  /models          list models available on the server
  /model <name>    switch model
  /translate <language> <text>
                   translate English text to Turkish, Spanish or Chinese
  /quit            exit";

/// 一次提交的结果
#[derive(Debug, Clone, Copy, PartialEq)]
enum Submitted {
    /// 已开始生成，附带的图片已写入历史
    Accepted,
    /// 没有可发送的内容（附带的图片都无法读取）
    Empty,
    /// 参数等问题导致提交被拒绝，历史未改变
    Rejected,
}

/// 根据提交结果处理排队的图片，需要提示用户时返回提示文本
fn settle_pending(pending: &mut Vec<PathBuf>, outcome: Submitted) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    match outcome {
        Submitted::Accepted => {
            pending.clear();
            None
        }
        Submitted::Empty => {
            let dropped = pending.len();
            pending.clear();
            Some(format!("None of the {} attached image(s) could be read, dropped them", dropped))
        }
        Submitted::Rejected => Some(format!(
            "{} attached image(s) kept for the next message",
            pending.len()
        )),
    }
}

/// 流式输出回复，生成失败时把错误信息作为回复展示
async fn respond(
    session: &mut ChatSession,
    input: UserInput,
    params: &GenerationParams,
    stdout: &mut tokio::io::Stdout,
) -> anyhow::Result<Submitted> {
    let stream = match session.submit(input, params) {
        Ok(stream) => stream,
        Err(Error::EmptyInput) => return Ok(Submitted::Empty),
        Err(e) => {
            println!("{}", e);
            return Ok(Submitted::Rejected);
        }
    };
    futures::pin_mut!(stream);

    let mut printed = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                // 每次产出的都是完整回复，只打印新增部分
                stdout.write_all(text[printed..].as_bytes()).await?;
                stdout.flush().await?;
                printed = text.len();
            }
            Err(e) => {
                error!("Generation failed: {}", e);
                stdout.write_all(format!("\n{}", e).as_bytes()).await?;
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(Submitted::Accepted)
}

fn init_logging(config: &LoggingConfig) {
    // 日志写到stderr，避免与流式回复混在一起
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Quit,
    Help,
    Attach(PathBuf),
    Save(PathBuf),
    ListSaved,
    ClearSaved,
    Reset,
    Models,
    Model(String),
    Translate(String, String),
    Prompt(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (name, arg) = match trimmed.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (trimmed, ""),
        };

        match name {
            "/quit" | "/exit" => Command::Quit,
            "/help" => Command::Help,
            "/attach" => Command::Attach(PathBuf::from(arg)),
            "/save" => Command::Save(PathBuf::from(arg)),
            "/saved" => Command::ListSaved,
            "/clear-saved" => Command::ClearSaved,
            "/reset" => Command::Reset,
            "/models" => Command::Models,
            "/model" if !arg.is_empty() => Command::Model(arg.to_string()),
            "/translate" => match arg.split_once(char::is_whitespace) {
                Some((language, text)) if !text.trim().is_empty() => {
                    Command::Translate(language.to_string(), text.trim().to_string())
                }
                _ => Command::Prompt(line.to_string()),
            },
            _ => Command::Prompt(line.to_string()),
        }
    }
}

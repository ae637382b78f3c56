use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};

pub fn print_plan<T: Serialize>(op: &str, plan: &T) -> Result<()> {
    let env = json!({ "op": op, "apply": false, "plan": plan });
    write_line(&env)
}

pub fn print_result<T: Serialize>(op: &str, result: &T) -> Result<()> {
    let env = json!({ "op": op, "apply": true, "result": result });
    write_line(&env)
}

fn write_line(env: &serde_json::Value) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, env)?;
    writeln!(&mut out)?;
    Ok(())
}

//! Human-readable disassembly of class images

use std::fmt::Write;

use crate::format::{ClassImage, ImageError};
use crate::opcode::Insn;

/// Disassemble encoded image bytes
pub fn disassemble(data: &[u8]) -> Result<String, ImageError> {
    Ok(disassemble_image(&ClassImage::decode(data)?))
}

/// Disassemble a decoded image
pub fn disassemble_image(image: &ClassImage) -> String {
    let mut out = String::new();
    let access = image.access.to_string();
    if !access.is_empty() {
        out.push_str(&access);
        out.push(' ');
    }
    let _ = write!(out, "class {}", image.name);
    if let Some(super_name) = &image.super_name {
        let _ = write!(out, " extends {}", super_name);
    }
    if !image.interfaces.is_empty() {
        let _ = write!(out, " implements {}", image.interfaces.join(", "));
    }
    out.push_str(" {\n");

    for field in &image.fields {
        let _ = writeln!(
            out,
            "  {}{} {};",
            prefix(&field.access.to_string()),
            field.descriptor.class_name(),
            field.name
        );
    }
    if !image.fields.is_empty() && !image.methods.is_empty() {
        out.push('\n');
    }

    for method in &image.methods {
        let _ = write!(
            out,
            "  {}{}",
            prefix(&method.access.to_string()),
            method.signature
        );
        if !method.exceptions.is_empty() {
            let _ = write!(out, " throws {}", method.exceptions.join(", "));
        }
        match &method.code {
            None => out.push_str(";\n"),
            Some(code) => {
                out.push_str(" {\n");
                for (index, insn) in code.iter().enumerate() {
                    let _ = writeln!(out, "    {:>3}: {}", index, format_insn(insn));
                }
                out.push_str("  }\n");
            }
        }
    }

    out.push_str("}\n");
    out
}

/// Format a single instruction
pub fn format_insn(insn: &Insn) -> String {
    let name = insn.opcode().name();
    match insn {
        Insn::LoadArg(n) | Insn::LoadCallback(n) => format!("{} {}", name, n),
        Insn::Jump(target) | Insn::JumpIfNull(target) => format!("{} -> {}", name, target),
        Insn::Invoke {
            owner, signature, ..
        } => format!("{} {}.{}", name, owner, signature),
        Insn::InvokeCallback { method } => format!("{} #{}", name, method),
        Insn::Checkcast(ty) | Insn::CoerceReturn(ty) => format!("{} {}", name, ty),
        _ => name.to_string(),
    }
}

fn prefix(access: &str) -> String {
    if access.is_empty() {
        String::new()
    } else {
        format!("{} ", access)
    }
}

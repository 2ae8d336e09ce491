//! The evaluator's environment: a stack of frames, each mapping a name to a
//! `(value, declared-type)` pair. Lookup walks top-to-bottom; writes go to
//! the innermost frame. Cloning an `Environment` makes a deep copy of the
//! frame stack itself (so a closure's capture is insulated from later
//! pushes/pops in the defining scope) while the `Value`s inside remain
//! reference-counted handles, so mutation of a shared object/list/map is
//! still visible through the clone.

use std::collections::HashMap;

use crate::types::Type;
use crate::value::Value;

pub type Frame = HashMap<String, (Value, Type)>;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    frames: Vec<Frame>,
}

impl Environment {
    pub fn new() -> Self {
        Self { frames: vec![Frame::new()] }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value, ty: Type) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), (value, ty));
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&(Value, Type)> {
        for frame in self.frames.iter().rev() {
            if let Some(entry) = frame.get(name) {
                return Some(entry);
            }
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut (Value, Type)> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(entry) = frame.get_mut(name) {
                return Some(entry);
            }
        }
        None
    }

    /// Writes go to whichever frame already binds the name (reassignment),
    /// falling back to the innermost frame for a first-time binding.
    pub fn assign(&mut self, name: &str, value: Value, ty: Type) {
        for frame in self.frames.iter_mut().rev() {
            if frame.contains_key(name) {
                frame.insert(name.to_string(), (value, ty));
                return;
            }
        }
        self.bind(name, value, ty);
    }

    /// Looks up a name in the bottom-most (outermost) frame only, used by
    /// `::name` scope resolution to reach the program's top-level scope
    /// regardless of how deeply nested the current call is.
    pub fn lookup_global(&self, name: &str) -> Option<&(Value, Type)> {
        self.frames.first().and_then(|f| f.get(name))
    }

    pub fn remove(&mut self, name: &str) {
        for frame in self.frames.iter_mut() {
            frame.remove(name);
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinType;

    #[test]
    fn lookup_walks_top_to_bottom() {
        let mut env = Environment::new();
        env.bind("x", Value::Int(1), Type::Builtin(BuiltinType::Int));
        env.push_frame();
        env.bind("x", Value::Int(2), Type::Builtin(BuiltinType::Int));
        assert!(matches!(env.lookup("x"), Some((Value::Int(2), _))));
        env.pop_frame();
        assert!(matches!(env.lookup("x"), Some((Value::Int(1), _))));
    }

    #[test]
    fn clone_is_insulated_from_later_pushes() {
        let mut env = Environment::new();
        env.bind("x", Value::Int(1), Type::Builtin(BuiltinType::Int));
        let snapshot = env.clone();
        env.push_frame();
        env.bind("x", Value::Int(99), Type::Builtin(BuiltinType::Int));
        assert!(matches!(snapshot.lookup("x"), Some((Value::Int(1), _))));
    }

    #[test]
    fn assign_reuses_existing_frame() {
        let mut env = Environment::new();
        env.bind("x", Value::Int(1), Type::Builtin(BuiltinType::Int));
        env.push_frame();
        env.assign("x", Value::Int(2), Type::Builtin(BuiltinType::Int));
        env.pop_frame();
        assert!(matches!(env.lookup("x"), Some((Value::Int(2), _))));
    }
}

use super::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

pub type EnvRef<'code> = Rc<RefCell<Environment<'code>>>;

/// One lexical scope at runtime.
///
/// The root environment holds globals by name because top-level code may
/// refer to a global before the statement defining it has executed. Every
/// nested scope stores its bindings in a slot vector instead; the resolver
/// has already turned those reads and writes into `(distance, index)` pairs.
#[derive(Debug)]
pub struct Environment<'code> {
    named: FxHashMap<&'code str, Value<'code>>,
    slots: Vec<Value<'code>>,
    enclosing: Option<EnvRef<'code>>,
}

impl<'code> Environment<'code> {
    pub fn root() -> EnvRef<'code> {
        Rc::new(RefCell::new(Self {
            named: FxHashMap::default(),
            slots: Vec::new(),
            enclosing: None,
        }))
    }

    pub fn child(enclosing: &EnvRef<'code>) -> EnvRef<'code> {
        Rc::new(RefCell::new(Self {
            named: FxHashMap::default(),
            slots: Vec::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    pub fn is_global(&self) -> bool {
        self.enclosing.is_none()
    }

    /// Defines (or redefines) a named global.
    pub fn define(&mut self, name: &'code str, value: Value<'code>) {
        self.named.insert(name, value);
    }

    /// Appends a slot; slot indexes follow definition order, which is the
    /// same order the resolver assigned them in.
    pub fn define_slot(&mut self, value: Value<'code>) {
        self.slots.push(value);
    }

    pub fn get(&self, name: &str) -> Option<Value<'code>> {
        self.named.get(name).cloned()
    }

    /// Reassigns a named global. Returns `false` if the name was never
    /// defined, so the caller can report the undefined variable.
    pub fn assign(&mut self, name: &str, value: Value<'code>) -> bool {
        match self.named.get_mut(name) {
            Some(stored) => {
                *stored = value;
                true
            }
            None => false,
        }
    }

    pub fn get_at(env: &EnvRef<'code>, distance: u32, index: u32) -> Value<'code> {
        Self::ancestor(env, distance).borrow().slots[index as usize].clone()
    }

    pub fn assign_at(env: &EnvRef<'code>, distance: u32, index: u32, value: Value<'code>) {
        Self::ancestor(env, distance).borrow_mut().slots[index as usize] = value;
    }

    fn ancestor(env: &EnvRef<'code>, distance: u32) -> EnvRef<'code> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let enclosing = current
                .borrow()
                .enclosing
                .clone()
                .expect("the resolver only hands out reachable scope distances");
            current = enclosing;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get_named() {
        let globals = Environment::root();
        globals.borrow_mut().define("greeting", Value::text("hi"));
        assert_eq!(globals.borrow().get("greeting"), Some(Value::text("hi")));
        assert_eq!(globals.borrow().get("missing"), None);
    }

    #[test]
    fn test_assign_requires_an_existing_name() {
        let globals = Environment::root();
        assert!(!globals.borrow_mut().assign("counter", Value::Int(1)));
        globals.borrow_mut().define("counter", Value::Int(1));
        assert!(globals.borrow_mut().assign("counter", Value::Int(2)));
        assert_eq!(globals.borrow().get("counter"), Some(Value::Int(2)));
    }

    #[test]
    fn test_slots_follow_definition_order() {
        let globals = Environment::root();
        let scope = Environment::child(&globals);
        scope.borrow_mut().define_slot(Value::Int(10));
        scope.borrow_mut().define_slot(Value::Int(20));
        assert_eq!(Environment::get_at(&scope, 0, 0), Value::Int(10));
        assert_eq!(Environment::get_at(&scope, 0, 1), Value::Int(20));
    }

    #[test]
    fn test_child_reads_enclosing_slot() {
        let globals = Environment::root();
        let outer = Environment::child(&globals);
        outer.borrow_mut().define_slot(Value::text("outer"));
        let inner = Environment::child(&outer);
        assert_eq!(Environment::get_at(&inner, 1, 0), Value::text("outer"));
    }

    #[test]
    fn test_assign_at_writes_through_to_the_owner() {
        let globals = Environment::root();
        let outer = Environment::child(&globals);
        outer.borrow_mut().define_slot(Value::Int(0));
        let inner = Environment::child(&outer);
        Environment::assign_at(&inner, 1, 0, Value::Int(7));
        assert_eq!(Environment::get_at(&outer, 0, 0), Value::Int(7));
    }

    #[test]
    fn test_only_the_root_is_global() {
        let globals = Environment::root();
        let scope = Environment::child(&globals);
        assert!(globals.borrow().is_global());
        assert!(!scope.borrow().is_global());
    }
}

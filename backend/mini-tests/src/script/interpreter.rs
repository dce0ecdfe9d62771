use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ast::{
    BinaryOp, CatchClause, DeclKind, Expr, FunctionBody, Iteration, ListItem, LogicalOp,
    ObjectProp, Pattern, Stmt, SwitchCase, TemplateSegment, UnaryOp,
};
use super::builtins;
use super::error::ScriptError;
use super::value::{format_number, loose_equals, strict_equals, Closure, Object, Value};
use super::{Console, Limits};

/// Longest string a script may build, in characters.
pub(crate) const MAX_STRING_LEN: usize = 1 << 24;

pub type Env = Rc<RefCell<Scope>>;

#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

fn new_env(parent: Option<Env>) -> Env {
    Rc::new(RefCell::new(Scope {
        vars: HashMap::new(),
        parent,
    }))
}

pub(crate) fn declare(env: &Env, name: &str, value: Value, mutable: bool) {
    env.borrow_mut()
        .vars
        .insert(name.to_string(), Binding { value, mutable });
}

fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut current = env.clone();
    loop {
        let next = {
            let scope = current.borrow();
            if let Some(binding) = scope.vars.get(name) {
                return Some(binding.value.clone());
            }
            scope.parent.clone()
        };
        current = next?;
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// How a pattern introduces its names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindMode {
    /// Plain assignment, also used by `var` since its names are hoisted.
    Assign,
    Let,
    Const,
    Param,
}

fn decl_mode(kind: DeclKind) -> BindMode {
    match kind {
        DeclKind::Var => BindMode::Assign,
        DeclKind::Let => BindMode::Let,
        DeclKind::Const => BindMode::Const,
    }
}

pub struct Interpreter<'a> {
    pub(crate) console: &'a mut dyn Console,
    limits: Limits,
    steps: u64,
    depth: usize,
    globals: Env,
    /// Value of the `throw` currently unwinding, handed to the next `catch`.
    thrown: Option<Value>,
}

impl<'a> Interpreter<'a> {
    pub fn new(console: &'a mut dyn Console, limits: Limits) -> Self {
        let globals = new_env(None);
        builtins::install_globals(&globals);
        Self {
            console,
            limits,
            steps: 0,
            depth: 0,
            globals,
            thrown: None,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs a program as the body of a function receiving `console`.
    pub fn run(&mut self, program: &[Stmt]) -> Result<(), ScriptError> {
        let env = new_env(Some(self.globals.clone()));
        declare(&env, "console", builtins::console_object(), true);
        declare(&env, "this", Value::Undefined, false);
        self.hoist(program, &env);
        match self.exec_block(program, &env)? {
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break | Flow::Continue => Err(illegal_jump()),
        }
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.limits.step_budget {
            return Err(ScriptError::BudgetExhausted(self.limits.step_budget));
        }
        Ok(())
    }

    // ---- declarations --------------------------------------------------

    fn hoist(&mut self, body: &[Stmt], env: &Env) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for name in names {
            if !env.borrow().vars.contains_key(&name) {
                declare(env, &name, Value::Undefined, true);
            }
        }
        hoist_functions(body, env);
    }

    fn declare_lexical(
        &mut self,
        env: &Env,
        name: &str,
        value: Value,
        mutable: bool,
    ) -> Result<(), ScriptError> {
        if env.borrow().vars.contains_key(name) {
            return Err(ScriptError::Syntax(format!(
                "Identifier '{}' has already been declared",
                name
            )));
        }
        declare(env, name, value, mutable);
        Ok(())
    }

    fn assign_variable(&mut self, env: &Env, name: &str, value: Value) -> Result<(), ScriptError> {
        let mut current = env.clone();
        loop {
            let next = {
                let mut scope = current.borrow_mut();
                if let Some(binding) = scope.vars.get_mut(name) {
                    if !binding.mutable {
                        return Err(ScriptError::type_error("Assignment to constant variable."));
                    }
                    binding.value = value;
                    return Ok(());
                }
                scope.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => break,
            }
        }
        // Sloppy-mode scripts create a global on assignment to an undeclared name.
        declare(&self.globals, name, value, true);
        Ok(())
    }

    // ---- statements ----------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
        for stmt in body {
            let flow = self.exec(stmt, env)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Decl { kind, declarations } => {
                self.exec_declaration(*kind, declarations, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, env),
            Stmt::ForEach {
                iteration,
                kind,
                target,
                iterable,
                body,
            } => self.exec_for_each(*iteration, *kind, target, iterable, body, env),
            Stmt::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, env),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), env),
            Stmt::Block(body) => self.exec_scoped(body, env),
            Stmt::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(argument) => {
                let value = self.eval(argument, env)?;
                let err = thrown(&value);
                self.thrown = Some(value);
                Err(err)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn exec_scoped(&mut self, body: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
        let scope = new_env(Some(env.clone()));
        hoist_functions(body, &scope);
        self.exec_block(body, &scope)
    }

    fn exec_declaration(
        &mut self,
        kind: DeclKind,
        declarations: &[(Pattern, Option<Expr>)],
        env: &Env,
    ) -> Result<(), ScriptError> {
        for (target, init) in declarations {
            let value = match init {
                Some(init) => self.eval(init, env)?,
                // `var x;` keeps the hoisted value.
                None if kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(target, value, env, decl_mode(kind))?;
        }
        Ok(())
    }

    fn bind_name(
        &mut self,
        name: &str,
        value: Value,
        env: &Env,
        mode: BindMode,
    ) -> Result<(), ScriptError> {
        match mode {
            BindMode::Assign => self.assign_variable(env, name, value),
            BindMode::Let => self.declare_lexical(env, name, value, true),
            BindMode::Const => self.declare_lexical(env, name, value, false),
            BindMode::Param => {
                declare(env, name, value, true);
                Ok(())
            }
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &Env,
        mode: BindMode,
    ) -> Result<(), ScriptError> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, env, mode),
            Pattern::Member(target) => {
                let (object, key) = self.eval_reference(target, env)?;
                builtins::set_property(&object, &key, value)
            }
            Pattern::Array { elements, rest } => {
                let mut items = builtins::iterable_items(&value)?.into_iter();
                for element in elements {
                    let item = items.next().unwrap_or(Value::Undefined);
                    if let Some(element) = element {
                        let item = self.with_default(item, element.default.as_ref(), env)?;
                        self.bind_pattern(&element.target, item, env, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, Value::array(items.collect()), env, mode)?;
                }
                Ok(())
            }
            Pattern::Object { properties, rest } => {
                if value.is_nullish() {
                    let shown = value.to_js_string();
                    return Err(ScriptError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        shown, shown
                    )));
                }
                for property in properties {
                    let item = builtins::get_property(&value, &property.key)?;
                    let item = self.with_default(item, property.default.as_ref(), env)?;
                    self.bind_pattern(&property.target, item, env, mode)?;
                }
                if let Some(rest) = rest {
                    let remaining = builtins::own_entries(&value)
                        .into_iter()
                        .filter(|(key, _)| properties.iter().all(|p| p.key.as_str() != &**key))
                        .collect();
                    self.bind_name(rest, Value::object(remaining), env, mode)?;
                }
                Ok(())
            }
        }
    }

    fn with_default(
        &mut self,
        value: Value,
        default: Option<&Expr>,
        env: &Env,
    ) -> Result<Value, ScriptError> {
        match (value, default) {
            (Value::Undefined, Some(default)) => self.eval(default, env),
            (value, _) => Ok(value),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Env,
    ) -> Result<Flow, ScriptError> {
        let mut scope = new_env(Some(env.clone()));
        let per_iteration = matches!(
            init,
            Some(Stmt::Decl {
                kind: DeclKind::Let,
                ..
            })
        );
        if let Some(init) = init {
            self.exec(init, &scope)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, &scope)?.truthy() {
                    break;
                }
            } else {
                self.tick()?;
            }
            match self.exec(body, &scope)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            if per_iteration {
                // Closures created in the body keep this iteration's binding.
                let copy = {
                    let current = scope.borrow();
                    Scope {
                        vars: current.vars.clone(),
                        parent: current.parent.clone(),
                    }
                };
                scope = Rc::new(RefCell::new(copy));
            }
            if let Some(update) = update {
                self.eval(update, &scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for_each(
        &mut self,
        iteration: Iteration,
        kind: Option<DeclKind>,
        target: &Pattern,
        iterable: &Expr,
        body: &Stmt,
        env: &Env,
    ) -> Result<Flow, ScriptError> {
        let source = self.eval(iterable, env)?;
        // Arrays are read lazily so that pushes made by the body are visited.
        let snapshot = match (iteration, &source) {
            (Iteration::Of, Value::Array(_)) => None,
            (Iteration::Of, other) => Some(builtins::iterable_items(other)?),
            (Iteration::In, other) => Some(builtins::own_keys(other)),
        };
        let mode = kind.map_or(BindMode::Assign, decl_mode);
        let mut index = 0usize;
        loop {
            let item = match (&snapshot, &source) {
                (Some(items), _) => items.get(index).cloned(),
                (None, Value::Array(items)) => items.borrow().get(index).cloned(),
                (None, _) => None,
            };
            let Some(item) = item else { break };
            index += 1;
            self.tick()?;

            let scope = new_env(Some(env.clone()));
            self.bind_pattern(target, item, &scope, mode)?;
            match self.exec(body, &scope)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    /// Strict-equality dispatch with fallthrough; `break` ends the switch.
    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        env: &Env,
    ) -> Result<Flow, ScriptError> {
        let value = self.eval(discriminant, env)?;
        let scope = new_env(Some(env.clone()));
        for case in cases {
            hoist_functions(&case.body, &scope);
        }

        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if strict_equals(&value, &self.eval(test, &scope)?) {
                    start = Some(index);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|case| case.test.is_none()))
        else {
            return Ok(Flow::Normal);
        };

        for case in &cases[start..] {
            match self.exec_block(&case.body, &scope)? {
                Flow::Normal => {}
                Flow::Break => break,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        env: &Env,
    ) -> Result<Flow, ScriptError> {
        let mut result = self.exec_scoped(block, env);
        if let Some(handler) = handler {
            result = match result {
                Err(err) if is_catchable(&err) => {
                    let value = self.caught_value(err);
                    self.exec_catch(handler, value, env)
                }
                other => other,
            };
        }

        let Some(finalizer) = finalizer else {
            return result;
        };
        if matches!(&result, Err(err) if !is_catchable(err)) {
            return result;
        }
        // The finalizer may throw and catch on its own; keep the pending value.
        let pending = self.thrown.take();
        match self.exec_scoped(finalizer, env)? {
            Flow::Normal => {
                self.thrown = pending;
                result
            }
            abrupt => Ok(abrupt),
        }
    }

    fn exec_catch(
        &mut self,
        handler: &CatchClause,
        value: Value,
        env: &Env,
    ) -> Result<Flow, ScriptError> {
        let scope = new_env(Some(env.clone()));
        if let Some(param) = &handler.param {
            self.bind_pattern(param, value, &scope, BindMode::Let)?;
        }
        self.exec_scoped(&handler.body, &scope)
    }

    /// The value a `catch` clause sees for `err`.
    fn caught_value(&mut self, err: ScriptError) -> Value {
        match err {
            ScriptError::Thrown(message) => {
                self.thrown.take().unwrap_or_else(|| Value::from(message))
            }
            other => Value::error_object(other.name(), other.to_string()),
        }
    }

    // ---- expressions ---------------------------------------------------

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Text(text) => out.push_str(text),
                        TemplateSegment::Expr(expr) => {
                            out.push_str(&self.eval(expr, env)?.to_js_string())
                        }
                    }
                    check_string_len(out.len())?;
                }
                Ok(Value::from(out))
            }
            Expr::Regex { pattern, flags } => builtins::make_regex(pattern, flags),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => lookup(env, name).ok_or_else(|| ScriptError::not_defined(name)),
            Expr::This => Ok(lookup(env, "this").unwrap_or(Value::Undefined)),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, env)?)),
            Expr::Object(properties) => {
                let mut object = Object::default();
                for property in properties {
                    match property {
                        ObjectProp::Field(key, value) => {
                            let value = self.eval(value, env)?;
                            object.set(key, value);
                        }
                        ObjectProp::Computed(key, value) => {
                            let key = self.eval(key, env)?.to_property_key();
                            let value = self.eval(value, env)?;
                            object.set(&key, value);
                        }
                        ObjectProp::Spread(source) => {
                            let source = self.eval(source, env)?;
                            for (key, value) in builtins::own_entries(&source) {
                                object.set(&key, value);
                            }
                        }
                    }
                }
                Ok(Value::Object(Rc::new(RefCell::new(object))))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: def.clone(),
                env: env.clone(),
            }))),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, env),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                binary_op(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            Expr::Destructure { pattern, value } => {
                let value = self.eval(value, env)?;
                self.bind_pattern(pattern, value.clone(), env, BindMode::Assign)?;
                Ok(value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => self.eval_update(*increment, *prefix, target, env),
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                builtins::get_property(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                builtins::get_property(&object, &key.to_property_key())
            }
            Expr::Call { callee, args } => {
                // Member calls pass their object as `this`.
                let (function, this) = match callee.as_ref() {
                    Expr::Member { object, property } => {
                        let object = self.eval(object, env)?;
                        (builtins::get_property(&object, property)?, object)
                    }
                    Expr::Index { object, index } => {
                        let object = self.eval(object, env)?;
                        let key = self.eval(index, env)?.to_property_key();
                        (builtins::get_property(&object, &key)?, object)
                    }
                    other => (self.eval(other, env)?, Value::Undefined),
                };
                let values = self.eval_items(args, env)?;
                if !function.is_callable() {
                    return Err(ScriptError::type_error(format!(
                        "{} is not a function",
                        describe(callee)
                    )));
                }
                self.call_function(&function, this, values)
            }
            Expr::New { callee, args } => {
                let values = self.eval_items(args, env)?;
                builtins::construct(callee, values)
            }
        }
    }

    /// Array elements or call arguments, expanding `...spread`.
    fn eval_items(&mut self, items: &[ListItem], env: &Env) -> Result<Vec<Value>, ScriptError> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Expr(expr) => values.push(self.eval(expr, env)?),
                ListItem::Spread(expr) => {
                    let source = self.eval(expr, env)?;
                    values.extend(builtins::iterable_items(&source)?);
                    builtins::check_array_len(values.len())?;
                }
            }
        }
        Ok(values)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> Result<Value, ScriptError> {
        if op == UnaryOp::Typeof {
            if let Expr::Ident(name) = operand {
                // `typeof undeclared` is not an error.
                let kind = lookup(env, name).map_or("undefined", |value| value.type_of());
                return Ok(Value::from(kind));
            }
        }
        let value = self.eval(operand, env)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => Value::from(value.type_of()),
        })
    }

    fn eval_assign(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
        env: &Env,
    ) -> Result<Value, ScriptError> {
        match target {
            Expr::Ident(name) => {
                let new_value = match op {
                    Some(op) => {
                        let current =
                            lookup(env, name).ok_or_else(|| ScriptError::not_defined(name))?;
                        let rhs = self.eval(value, env)?;
                        binary_op(op, &current, &rhs)?
                    }
                    None => self.eval(value, env)?,
                };
                self.assign_variable(env, name, new_value.clone())?;
                Ok(new_value)
            }
            Expr::Member { .. } | Expr::Index { .. } => {
                let (object, key) = self.eval_reference(target, env)?;
                let new_value = match op {
                    Some(op) => {
                        let current = builtins::get_property(&object, &key)?;
                        let rhs = self.eval(value, env)?;
                        binary_op(op, &current, &rhs)?
                    }
                    None => self.eval(value, env)?,
                };
                builtins::set_property(&object, &key, new_value.clone())?;
                Ok(new_value)
            }
            _ => Err(ScriptError::Syntax(
                "Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    fn eval_update(
        &mut self,
        increment: bool,
        prefix: bool,
        target: &Expr,
        env: &Env,
    ) -> Result<Value, ScriptError> {
        let delta = if increment { 1.0 } else { -1.0 };
        let old = match target {
            Expr::Ident(name) => {
                let current = lookup(env, name).ok_or_else(|| ScriptError::not_defined(name))?;
                let old = current.to_number();
                self.assign_variable(env, name, Value::Number(old + delta))?;
                old
            }
            _ => {
                let (object, key) = self.eval_reference(target, env)?;
                let old = builtins::get_property(&object, &key)?.to_number();
                builtins::set_property(&object, &key, Value::Number(old + delta))?;
                old
            }
        };
        Ok(Value::Number(if prefix { old + delta } else { old }))
    }

    /// Evaluates the object and key of a member or index target.
    fn eval_reference(&mut self, target: &Expr, env: &Env) -> Result<(Value, String), ScriptError> {
        match target {
            Expr::Member { object, property } => Ok((self.eval(object, env)?, property.clone())),
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?.to_property_key();
                Ok((object, key))
            }
            _ => Err(ScriptError::Syntax(
                "Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    // ---- calls ---------------------------------------------------------

    /// Calls `callee` with an undefined `this`, as library callbacks are.
    pub(crate) fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.call_function(callee, Value::Undefined, args)
    }

    fn call_function(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Host(host) => builtins::call_host(self, *host, args),
            Value::Method(method) => builtins::call_method(self, &method.receiver, &method.name, args),
            other => Err(ScriptError::type_error(format!(
                "{} is not a function",
                other.inspect()
            ))),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::StackOverflow);
        }
        self.depth += 1;
        let result = self.invoke(closure, this, args);
        self.depth -= 1;
        result
    }

    fn invoke(
        &mut self,
        closure: &Rc<Closure>,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let def = &closure.def;
        let scope = new_env(Some(closure.env.clone()));
        // Arrow functions see `this` and their own name through the enclosing scope.
        if !def.is_arrow {
            if let Some(name) = &def.name {
                declare(&scope, name, Value::Function(closure.clone()), true);
            }
            declare(&scope, "this", this, false);
        }

        let mut args = args.into_iter();
        for param in &def.params {
            let value = args.next().unwrap_or(Value::Undefined);
            let value = self.with_default(value, param.default.as_ref(), &scope)?;
            self.bind_pattern(&param.target, value, &scope, BindMode::Param)?;
        }
        if let Some(rest) = &def.rest {
            self.bind_pattern(rest, Value::array(args.collect()), &scope, BindMode::Param)?;
        }

        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist(body, &scope);
                match self.exec_block(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Undefined),
                    Flow::Break | Flow::Continue => Err(illegal_jump()),
                }
            }
        }
    }
}

fn hoist_functions(body: &[Stmt], env: &Env) {
    for stmt in body {
        if let Stmt::Function(def) = stmt {
            if let Some(name) = &def.name {
                let closure = Closure {
                    def: def.clone(),
                    env: env.clone(),
                };
                declare(env, name, Value::Function(Rc::new(closure)), true);
            }
        }
    }
}

/// `var` names declared anywhere in a function body, nested functions excluded.
fn collect_var_names(body: &[Stmt], names: &mut Vec<String>) {
    for stmt in body {
        collect_var_names_in(stmt, names);
    }
}

fn collect_var_names_in(stmt: &Stmt, names: &mut Vec<String>) {
    match stmt {
        Stmt::Decl {
            kind: DeclKind::Var,
            declarations,
        } => {
            for (target, _) in declarations {
                collect_pattern_names(target, names);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names_in(consequent, names);
            if let Some(alternate) = alternate {
                collect_var_names_in(alternate, names);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names_in(body, names),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names_in(init, names);
            }
            collect_var_names_in(body, names);
        }
        Stmt::ForEach {
            kind, target, body, ..
        } => {
            if *kind == Some(DeclKind::Var) {
                collect_pattern_names(target, names);
            }
            collect_var_names_in(body, names);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_var_names(&case.body, names);
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            collect_var_names(block, names);
            if let Some(handler) = handler {
                collect_var_names(&handler.body, names);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, names);
            }
        }
        Stmt::Block(body) => collect_var_names(body, names),
        _ => {}
    }
}

fn collect_pattern_names(pattern: &Pattern, names: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => names.push(name.clone()),
        Pattern::Member(_) => {}
        Pattern::Array { elements, rest } => {
            for element in elements.iter().flatten() {
                collect_pattern_names(&element.target, names);
            }
            if let Some(rest) = rest {
                collect_pattern_names(rest, names);
            }
        }
        Pattern::Object { properties, rest } => {
            for property in properties {
                collect_pattern_names(&property.target, names);
            }
            names.extend(rest.iter().cloned());
        }
    }
}

/// Early errors and an exhausted budget unwind past every `catch`.
fn is_catchable(err: &ScriptError) -> bool {
    !matches!(
        err,
        ScriptError::Syntax(_) | ScriptError::BudgetExhausted(_)
    )
}

fn illegal_jump() -> ScriptError {
    ScriptError::Syntax("Illegal break or continue statement".to_string())
}

/// Message of a thrown value: its `message` when truthy, the value itself otherwise.
fn thrown(value: &Value) -> ScriptError {
    let message = match value {
        Value::Object(object) => object
            .borrow()
            .get("message")
            .filter(|message| message.truthy())
            .map(Value::to_js_string),
        _ => None,
    };
    ScriptError::Thrown(message.unwrap_or_else(|| value.to_js_string()))
}

/// Source-like name of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Str(s) => format!("\"{}\"", s),
        Expr::Number(n) => format_number(*n),
        Expr::Member { object, property } => format!("{}.{}", describe(object), property),
        Expr::Index { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "(intermediate value)".to_string(),
    }
}

pub(crate) fn check_string_len(len: usize) -> Result<(), ScriptError> {
    if len > MAX_STRING_LEN {
        return Err(ScriptError::Range("Invalid string length".to_string()));
    }
    Ok(())
}

/// Strings for `+` and comparisons: arrays, objects and functions become their string form.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::Str(_) => {
            value.clone()
        }
        other => Value::from(other.to_js_string()),
    }
}

pub(crate) fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let value = match op {
        BinaryOp::Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                let mut out = left.to_js_string();
                out.push_str(&right.to_js_string());
                check_string_len(out.len())?;
                Value::from(out)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(js_pow(left.to_number(), right.to_number())),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Value::Bool(compare(op, left, right))
        }
        BinaryOp::LooseEq => Value::Bool(loose_equals(left, right)),
        BinaryOp::LooseNotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
        BinaryOp::In => Value::Bool(builtins::has_property(right, &left.to_property_key())?),
    };
    Ok(value)
}

pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    let (left, right) = (to_primitive(left), to_primitive(right));
    if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (left.to_number(), right.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

use serde::{Deserialize, Serialize};

pub const BACK_STACK_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOutcome {
    /// The new stack top; its entry actions should run.
    Menu(String),
    /// Nothing usable left; navigation was reset and start actions should run.
    Restart,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    back_stack: Vec<String>,
    current_menu: Option<String>,
}

impl NavigationState {
    pub fn current_menu(&self) -> Option<&str> {
        self.current_menu.as_deref()
    }

    pub fn back_stack(&self) -> &[String] {
        &self.back_stack
    }

    pub fn navigate(&mut self, target: &str, add_to_back_stack: bool, unique_in_stack: bool) {
        self.current_menu = Some(target.to_string());
        if !add_to_back_stack {
            return;
        }
        if unique_in_stack {
            self.back_stack.retain(|entry| entry != target);
        }
        if self.back_stack.last().map(String::as_str) == Some(target) {
            return;
        }
        self.back_stack.push(target.to_string());
        if self.back_stack.len() > BACK_STACK_CAP {
            let overflow = self.back_stack.len() - BACK_STACK_CAP;
            self.back_stack.drain(..overflow);
        }
    }

    pub fn back(&mut self) -> BackOutcome {
        self.back_stack.pop();
        match self.back_stack.last() {
            Some(top) => {
                let top = top.clone();
                self.current_menu = Some(top.clone());
                BackOutcome::Menu(top)
            }
            None => {
                self.reset();
                BackOutcome::Restart
            }
        }
    }

    pub fn reset(&mut self) {
        self.back_stack.clear();
        self.current_menu = None;
    }
}

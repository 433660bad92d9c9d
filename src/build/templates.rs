//! Static scaffold files written when generation produces nothing usable.

pub const BACKEND_MAIN: &str = r#"from fastapi import FastAPI

app = FastAPI(title="Generated FastAPI Backend")

@app.get("/health")
def health():
    return {"status": "ok"}
"#;

pub const BACKEND_REQUIREMENTS: &str = "fastapi\nuvicorn\npydantic\n";

pub const BACKEND_TEST_HEALTH: &str = r#"def test_health_smoke():
    assert 1 + 1 == 2
"#;

pub const TESTS_API_SMOKE: &str = r#"from fastapi.testclient import TestClient

from backend.main import app


def test_health_returns_ok():
    client = TestClient(app)
    resp = client.get("/health")
    assert resp.status_code == 200
"#;

pub const PYTEST_INI: &str = "[pytest]\naddopts = -q\n";

pub const DOCKERFILE: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY backend/requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
EXPOSE 8000
CMD ["uvicorn", "backend.main:app", "--host", "0.0.0.0", "--port", "8000"]
"#;

pub const DOCKER_COMPOSE: &str = r#"services:
  api:
    build: .
    ports:
      - "8000:8000"
    command: uvicorn backend.main:app --host 0.0.0.0 --port 8000
  web:
    build: ./frontend
    command: npm run dev
    ports:
      - "5173:5173"
    depends_on:
      - api
"#;

pub const GH_ACTIONS_DEPLOY: &str = r#"name: Deploy
on: [push]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v3
      - uses: actions/setup-python@v5
        with:
          python-version: '3.11'
      - name: Install backend deps
        run: |
          pip install -r backend/requirements.txt
      - name: Run tests
        run: pytest -q
"#;

pub const MKDOCS: &str = r#"site_name: Generated Project Docs
nav:
  - Home: index.md
theme:
  name: material
"#;

pub const DOCS_INDEX: &str = r#"# Project Documentation

Welcome! Use the README for quickstart. This site can be served with `mkdocs serve`.
"#;

/// README used when no provider produced one.
pub fn readme(prompt: &str) -> String {
    format!(
        "# Project\n\n{prompt}\n\n## Setup\n\n```bash\npip install -r backend/requirements.txt\n```\n\n\
         ## Run\n\n```bash\nuvicorn backend.main:app --reload\n```\n\n\
         ## Test\n\n```bash\npytest -q\n```\n\n\
         ## Deploy\n\n```bash\ndocker compose up --build\n```\n"
    )
}

/// Requirements document used when no provider produced one.
pub fn requirements_md(prompt: &str) -> String {
    format!(
        "# Requirements\n\n## Description\n\n{prompt}\n\n## Modules\n\n- Auth\n- Core\n\n\
         ## Stack\n\n- Frontend: React, TailwindCSS\n- Backend: FastAPI, SQLite\n\n\
         ## Deployment\n\nDocker + GitHub Actions\n"
    )
}

const PACKAGE_JSON: &str = r#"{
  "name": "generated-frontend",
  "private": true,
  "version": "0.0.1",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview --port 5173"
  },
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.2.0",
    "autoprefixer": "^10.4.18",
    "postcss": "^8.4.38",
    "tailwindcss": "^3.4.3",
    "vite": "^5.0.0"
  }
}
"#;

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: [
    './index.html',
    './src/**/*.{js,ts,jsx,tsx}',
  ],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
  server: { host: '0.0.0.0', port: 5173 }
})
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Generated App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"import { useEffect, useState } from 'react'

export default function App() {
  const [status, setStatus] = useState('unknown')
  useEffect(() => {
    fetch('http://localhost:8000/health').then(r => setStatus(r.ok ? 'online' : 'offline')).catch(() => setStatus('offline'))
  }, [])
  return (
    <div className="min-h-screen bg-gray-50 text-gray-900">
      <header className="p-4 border-b bg-white">
        <h1 className="text-xl font-semibold">Generated Frontend</h1>
        <p className="text-sm text-gray-500">API status: {status}</p>
      </header>
      <main className="p-6">
        <div className="max-w-xl mx-auto bg-white shadow rounded p-4">
          <h2 className="text-lg font-medium mb-2">Welcome</h2>
          <p>Project: {document.title}</p>
        </div>
      </main>
    </div>
  )
}
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

html, body, #root { height: 100%; }
"#;

/// React + Tailwind + Vite scaffold, paths relative to `frontend/`.
pub const FRONTEND: &[(&str, &str)] = &[
    ("package.json", PACKAGE_JSON),
    ("tailwind.config.js", TAILWIND_CONFIG),
    ("postcss.config.js", POSTCSS_CONFIG),
    ("vite.config.js", VITE_CONFIG),
    ("index.html", INDEX_HTML),
    ("src/main.jsx", MAIN_JSX),
    ("src/App.jsx", APP_JSX),
    ("src/index.css", INDEX_CSS),
];
